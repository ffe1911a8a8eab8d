//! Session - the mutable record threaded through one workflow run

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Plan, PlanStep, TripRequest, now_ms};
use crate::llm::{Message, Role, TokenUsage};
use crate::workflow::WorkflowStage;

/// Placeholder handed to the executor before any research exists
pub const NO_PREVIOUS_RESULTS: &str = "No previous results yet.";

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Running,
    Complete,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "complete" | "completed" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown session status '{}': expected running, complete or failed", other)),
        }
    }
}

/// One travel-research session
///
/// `conversation` only grows. `current_step` only moves forward, except
/// that a granted replan resets it to 0. `stage` is the next stage to run,
/// so a checkpointed session resumes exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier (UUID v7)
    pub id: String,

    /// Immutable inputs
    pub request: TripRequest,

    /// Role-tagged messages, append-only
    pub conversation: Vec<Message>,

    /// Current plan; replaced wholesale on replan
    pub plan: Option<Plan>,

    /// Zero-based cursor into `plan.steps`
    pub current_step: usize,

    /// Latest refined query for a worker
    pub agent_query: String,

    /// Set by the executor, consumed by the next route
    pub replan_flag: bool,

    /// Replans requested per step index; never decremented
    pub replan_attempts: BTreeMap<usize, u32>,

    /// Curated destination snippets, fetched once; `Some("")` when none
    pub rag_context: Option<String>,

    /// Final markdown itinerary
    pub final_answer: Option<String>,

    /// Next stage to run
    pub stage: WorkflowStage,

    /// Tool-dispatch rounds within the current step
    pub tool_rounds: u32,

    pub status: SessionStatus,

    /// Error text when `status` is `Failed`
    pub error: Option<String>,

    /// Accumulated token usage across all LLM calls
    pub usage: TokenUsage,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Session {
    /// Start a new session at the planner stage
    pub fn new(request: TripRequest) -> Self {
        let now = now_ms();
        let id = uuid::Uuid::now_v7().to_string();
        debug!(session_id = %id, "Session::new: called");
        Self {
            id,
            request,
            conversation: Vec::new(),
            plan: None,
            current_step: 0,
            agent_query: String::new(),
            replan_flag: false,
            replan_attempts: BTreeMap::new(),
            rag_context: None,
            final_answer: None,
            stage: WorkflowStage::Planner,
            tool_rounds: 0,
            status: SessionStatus::Running,
            error: None,
            usage: TokenUsage::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Plan step under the cursor, if any
    pub fn current_plan_step(&self) -> Option<&PlanStep> {
        self.plan.as_ref().and_then(|p| p.step(self.current_step))
    }

    /// Most recently appended message
    pub fn last_message(&self) -> Option<&Message> {
        self.conversation.last()
    }

    /// Text of every assistant message that has any, in order
    pub fn assistant_texts(&self) -> impl Iterator<Item = String> + '_ {
        self.conversation
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(Message::text)
            .filter(|t| !t.is_empty())
    }

    /// Assistant texts joined by newlines, for the executor
    pub fn previous_results(&self) -> String {
        let joined = self.assistant_texts().collect::<Vec<_>>().join("\n");
        if joined.is_empty() {
            NO_PREVIOUS_RESULTS.to_string()
        } else {
            joined
        }
    }

    /// Numbered assistant texts, for the synthesizer
    pub fn research_summary(&self) -> String {
        self.assistant_texts()
            .enumerate()
            .map(|(i, text)| format!("Research {}: \n{}", i + 1, text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Replans requested so far at a step index
    pub fn replan_attempts_for(&self, step: usize) -> u32 {
        self.replan_attempts.get(&step).copied().unwrap_or(0)
    }

    /// Count one more replan request at a step index
    pub fn record_replan(&mut self, step: usize) -> u32 {
        let attempts = self.replan_attempts.entry(step).or_insert(0);
        *attempts += 1;
        debug!(session_id = %self.id, step, attempts = *attempts, "Session::record_replan: called");
        *attempts
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.usage.add(usage);
    }

    /// Mark the session failed with an error message
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SessionStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }

    /// Bump `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}
