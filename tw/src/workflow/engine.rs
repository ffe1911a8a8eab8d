//! WorkflowEngine - drives sessions through the stage machine
//!
//! One stage runs at a time per session; the session is checkpointed after
//! every transition so a run can be inspected or resumed. Independent
//! sessions share the engine and run concurrently.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::domain::{Session, SessionStatus, TripRequest};
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;
use crate::retrieval::Retriever;
use crate::state::StateManager;
use crate::tools::ToolExecutor;

use super::stages::{self, StageContext};
use super::{WorkflowConfig, WorkflowError, WorkflowStage, router};

/// Runs travel-research sessions
pub struct WorkflowEngine {
    llm: Arc<dyn LlmClient>,
    tools: ToolExecutor,
    retriever: Arc<dyn Retriever>,
    prompts: PromptLoader,
    state: Option<StateManager>,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    /// Create an engine without checkpointing
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolExecutor,
        retriever: Arc<dyn Retriever>,
        prompts: PromptLoader,
        config: WorkflowConfig,
    ) -> Self {
        debug!(?config, "WorkflowEngine::new: called");
        Self {
            llm,
            tools,
            retriever,
            prompts,
            state: None,
            config,
        }
    }

    /// Checkpoint sessions through `state`
    pub fn with_state(mut self, state: StateManager) -> Self {
        debug!("WorkflowEngine::with_state: called");
        self.state = Some(state);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run a new session to completion
    pub async fn start(&self, request: TripRequest) -> Result<Session, WorkflowError> {
        let session = Session::new(request);
        info!(session_id = %session.id, query = %session.request.user_query, "Starting session");
        self.run(session).await
    }

    /// Continue a checkpointed session from its stored stage
    ///
    /// A failed session is retried from the stage that failed.
    pub async fn resume(&self, session_id: &str) -> Result<Session, WorkflowError> {
        debug!(%session_id, "WorkflowEngine::resume: called");
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))?;
        let mut session = state
            .get_session(session_id)
            .await?
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))?;

        if session.status == SessionStatus::Complete || session.stage.is_done() {
            return Err(WorkflowError::AlreadyFinished(session.id));
        }
        if session.status == SessionStatus::Failed {
            info!(session_id = %session.id, stage = %session.stage, "Retrying failed session");
            session.status = SessionStatus::Running;
            session.error = None;
        }

        info!(session_id = %session.id, stage = %session.stage, step = session.current_step, "Resuming session");
        self.run(session).await
    }

    /// Drive `session` until it is done or a stage fails
    ///
    /// On failure the session is checkpointed as `Failed` and the error is
    /// returned; nothing is made of the partial research.
    pub async fn run(&self, mut session: Session) -> Result<Session, WorkflowError> {
        debug!(session_id = %session.id, stage = %session.stage, "WorkflowEngine::run: called");
        self.checkpoint(&session).await?;

        while !session.stage.is_done() {
            if let Err(e) = self.step(&mut session).await {
                error!(session_id = %session.id, stage = %session.stage, error = %e, "Session failed");
                session.fail(e.to_string());
                if let Err(save_err) = self.checkpoint(&session).await {
                    warn!(session_id = %session.id, error = %save_err, "Failed to checkpoint failed session");
                }
                return Err(e);
            }
            self.checkpoint(&session).await?;
        }

        info!(
            session_id = %session.id,
            input_tokens = session.usage.input_tokens,
            output_tokens = session.usage.output_tokens,
            "Session complete"
        );
        Ok(session)
    }

    /// Execute the session's current stage and select the next one
    pub async fn step(&self, session: &mut Session) -> Result<WorkflowStage, WorkflowError> {
        let stage = session.stage;
        debug!(session_id = %session.id, %stage, step = session.current_step, "WorkflowEngine::step: called");

        let ctx = StageContext {
            llm: self.llm.as_ref(),
            tools: &self.tools,
            retriever: self.retriever.as_ref(),
            prompts: &self.prompts,
            config: &self.config,
        };

        let next = match stage {
            WorkflowStage::Planner => {
                stages::planner(&ctx, session).await?;
                WorkflowStage::Executor
            }
            WorkflowStage::Executor => {
                stages::executor(&ctx, session).await?;
                let next = router::route_after_executor(session, self.config.max_replan_attempts)?;
                // The flag only informs this one routing decision
                session.replan_flag = false;
                next
            }
            WorkflowStage::Worker(agent) => {
                stages::worker(&ctx, session, agent).await?;
                router::should_use_tools(session)?
            }
            WorkflowStage::ToolDispatch(_) => {
                stages::tool_dispatch(&ctx, session).await?;
                router::route_after_tool(session)?
            }
            WorkflowStage::AdvanceStep => {
                stages::advance_step(session);
                router::route_after_step(session)?
            }
            WorkflowStage::Synthesizer => {
                stages::synthesizer(&ctx, session).await?;
                WorkflowStage::Done
            }
            WorkflowStage::Done => return Err(WorkflowError::AlreadyFinished(session.id.clone())),
        };

        info!(session_id = %session.id, from = %stage, to = %next, step = session.current_step, "Stage transition");
        session.stage = next;
        if next.is_done() {
            session.status = SessionStatus::Complete;
        }
        session.touch();
        Ok(next)
    }

    /// Run many sessions with at most `concurrency` in flight
    ///
    /// Results come back in request order.
    pub async fn run_batch(
        &self,
        requests: Vec<TripRequest>,
        concurrency: usize,
    ) -> Vec<Result<Session, WorkflowError>> {
        debug!(request_count = %requests.len(), concurrency, "WorkflowEngine::run_batch: called");
        stream::iter(requests)
            .map(|request| self.start(request))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn checkpoint(&self, session: &Session) -> Result<(), WorkflowError> {
        if let Some(state) = &self.state {
            state.save_session(session.clone()).await?;
        }
        Ok(())
    }
}
