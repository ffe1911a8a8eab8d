//! Integration tests for the research workflow
//!
//! A scripted LLM answers each stage by looking at the request it gets,
//! so the state machine runs end to end without network access.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;
use tempfile::TempDir;

use tripwright::config::WorkflowConfig;
use tripwright::domain::{AgentKind, Session, SessionStatus, TripRequest};
use tripwright::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, Role, ToolCall};
use tripwright::prompts::PromptLoader;
use tripwright::retrieval::{RetrievalError, Retriever};
use tripwright::state::StateManager;
use tripwright::tools::{SearchHit, SearchProvider, ToolError, ToolExecutor};
use tripwright::workflow::{WorkflowEngine, WorkflowError, WorkflowStage};

// =============================================================================
// Collaborator stubs
// =============================================================================

#[derive(Debug, Default, Clone)]
struct Counts {
    planner: usize,
    executor: usize,
    logistics: usize,
    activities: usize,
    synthesizer: usize,
    worker_without_tools: usize,
}

/// LLM that plays every stage from a script
struct ScriptedLlm {
    /// Plans handed out in order; the last one repeats
    plans: Mutex<VecDeque<Vec<AgentKind>>>,
    /// `needs_replan` per executor call; `false` once exhausted
    replans: Mutex<VecDeque<bool>>,
    /// Tool rounds a worker asks for before answering in text
    tool_rounds: usize,
    /// Ask for tools even when none are bound
    ignores_tool_binding: bool,
    counts: Mutex<Counts>,
    next_id: Mutex<usize>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    fn new(plan: Vec<AgentKind>) -> Self {
        Self {
            plans: Mutex::new(VecDeque::from(vec![plan])),
            replans: Mutex::new(VecDeque::new()),
            tool_rounds: 0,
            ignores_tool_binding: false,
            counts: Mutex::new(Counts::default()),
            next_id: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_plans(self, plans: Vec<Vec<AgentKind>>) -> Self {
        *self.plans.lock().unwrap() = plans.into();
        self
    }

    fn with_replans(self, replans: Vec<bool>) -> Self {
        *self.replans.lock().unwrap() = replans.into();
        self
    }

    fn with_tool_rounds(mut self, rounds: usize) -> Self {
        self.tool_rounds = rounds;
        self
    }

    fn ignoring_tool_binding(mut self) -> Self {
        self.ignores_tool_binding = true;
        self
    }

    fn counts(&self) -> Counts {
        self.counts.lock().unwrap().clone()
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    fn next_id(&self) -> usize {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    fn plan_response(&self) -> CompletionResponse {
        let mut plans = self.plans.lock().unwrap();
        let agents = if plans.len() > 1 {
            plans.pop_front().unwrap()
        } else {
            plans.front().cloned().unwrap()
        };
        let steps: Vec<serde_json::Value> = agents
            .iter()
            .enumerate()
            .map(|(i, agent)| {
                serde_json::json!({
                    "step": i + 1,
                    "agent": agent,
                    "query": format!("research {} for Lisbon", i + 1),
                    "description": format!("step {}", i + 1),
                })
            })
            .collect();
        CompletionResponse::tool_use(vec![ToolCall::new(
            "plan",
            "submit_plan",
            serde_json::json!({
                "destination": "Lisbon",
                "trip_summary": "A few days in Lisbon",
                "steps": steps,
            }),
        )])
    }

    fn decision_response(&self) -> CompletionResponse {
        let replan = self.replans.lock().unwrap().pop_front().unwrap_or(false);
        CompletionResponse::tool_use(vec![ToolCall::new(
            "decision",
            "submit_decision",
            serde_json::json!({
                "agent_query": format!("refined query {}", self.next_id()),
                "needs_replan": replan,
                "replan_reason": if replan { "results unusable" } else { "" },
            }),
        )])
    }

    fn worker_response(&self, request: &CompletionRequest, label: &str) -> CompletionResponse {
        // Tool rounds already taken for this query: tool-call turns at the
        // tail of the conversation, before the final query turn
        let history = &request.messages[..request.messages.len().saturating_sub(1)];
        let rounds_taken = history
            .iter()
            .rev()
            .take_while(|m| m.role == Role::Tool || m.has_tool_calls())
            .filter(|m| m.has_tool_calls())
            .count();

        let may_call = self.ignores_tool_binding || !request.tools.is_empty();
        if may_call && rounds_taken < self.tool_rounds {
            let id = self.next_id();
            return CompletionResponse::tool_use(vec![ToolCall::new(
                format!("call_{}", id),
                "web_search",
                serde_json::json!({"query": format!("{} search {}", label, id)}),
            )]);
        }
        CompletionResponse::text(format!("{} findings #{}", label, self.next_id()))
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());

        let response = match request.forced_tool() {
            Some("submit_plan") => {
                self.counts.lock().unwrap().planner += 1;
                self.plan_response()
            }
            Some("submit_decision") => {
                self.counts.lock().unwrap().executor += 1;
                self.decision_response()
            }
            Some(other) => return Err(LlmError::InvalidResponse(format!("unexpected forced tool {}", other))),
            None => {
                let system = request.system_prompt.as_str();
                if request.tools.is_empty() && !system.contains("itinerary planner") {
                    self.counts.lock().unwrap().worker_without_tools += 1;
                }
                if system.contains("travel logistics researcher") {
                    self.counts.lock().unwrap().logistics += 1;
                    self.worker_response(&request, "logistics")
                } else if system.contains("activities and culture researcher") {
                    self.counts.lock().unwrap().activities += 1;
                    self.worker_response(&request, "activities")
                } else if system.contains("itinerary planner") {
                    self.counts.lock().unwrap().synthesizer += 1;
                    CompletionResponse::text("# Trip Overview\nLisbon\n\n## Day-by-Day Itinerary\nDay 1: Alfama")
                } else {
                    return Err(LlmError::InvalidResponse("unrecognized stage".to_string()));
                }
            }
        };
        Ok(response)
    }
}

struct FakeSearch;

#[async_trait]
impl SearchProvider for FakeSearch {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ToolError> {
        Ok((0..k)
            .map(|i| SearchHit {
                title: format!("{} {}", query, i),
                url: format!("https://example.com/{}", i),
                content: "Lisbon excerpt".to_string(),
            })
            .collect())
    }
}

struct DownSearch;

#[async_trait]
impl SearchProvider for DownSearch {
    fn name(&self) -> &'static str {
        "down"
    }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>, ToolError> {
        Err(ToolError::Search {
            provider: "down".to_string(),
            message: "HTTP 503".to_string(),
        })
    }
}

struct CuratedRetriever;

#[async_trait]
impl Retriever for CuratedRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(["Lisbon has seven hills.", "Tram 28 crosses Alfama."]
            .iter()
            .take(k)
            .map(|s| s.to_string())
            .collect())
    }
}

fn engine_with(llm: Arc<ScriptedLlm>, search: Arc<dyn SearchProvider>) -> WorkflowEngine {
    WorkflowEngine::new(
        llm,
        ToolExecutor::research(search, 3),
        Arc::new(CuratedRetriever),
        PromptLoader::embedded_only(),
        WorkflowConfig::default(),
    )
}

fn engine(llm: Arc<ScriptedLlm>) -> WorkflowEngine {
    engine_with(llm, Arc::new(FakeSearch))
}

use AgentKind::{ActivitiesWorker, LogisticsWorker};

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_lisbon_two_step_run() {
    let llm = Arc::new(ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]));
    let engine = engine(llm.clone());

    let request = TripRequest::new("4 days in Lisbon").with_duration("4");
    let session = engine.start(request).await.unwrap();

    let counts = llm.counts();
    assert_eq!(counts.planner, 1);
    assert_eq!(counts.executor, 2);
    assert_eq!(counts.logistics, 1);
    assert_eq!(counts.activities, 1);
    assert_eq!(counts.synthesizer, 1);

    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.current_step, 2);
    let answer = session.final_answer.unwrap();
    assert!(answer.starts_with("# Trip Overview"));
    assert_eq!(session.rag_context.as_deref(), Some("Lisbon has seven hills.\n\nTram 28 crosses Alfama."));
}

#[tokio::test]
async fn test_replan_three_times_on_first_step() {
    let llm = Arc::new(
        ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]).with_replans(vec![true, true, true]),
    );
    let engine = engine(llm.clone());
    let mut session = Session::new(TripRequest::new("Lisbon"));

    let mut route = Vec::new();
    for _ in 0..6 {
        route.push(engine.step(&mut session).await.unwrap());
    }

    assert_eq!(
        route,
        vec![
            WorkflowStage::Executor,
            WorkflowStage::Planner,
            WorkflowStage::Executor,
            WorkflowStage::Planner,
            WorkflowStage::Executor,
            WorkflowStage::Worker(LogisticsWorker),
        ]
    );
    assert_eq!(session.replan_attempts_for(0), 3);
    assert_eq!(llm.counts().planner, 3);
    assert_eq!(session.current_step, 0);

    // The run still completes on the existing plan
    let session = engine.run(session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.replan_attempts_for(0), 3);
}

#[tokio::test]
async fn test_replan_replaces_plan_and_keeps_other_counters() {
    let llm = Arc::new(
        ScriptedLlm::new(vec![])
            .with_plans(vec![
                vec![LogisticsWorker, ActivitiesWorker],
                vec![ActivitiesWorker, LogisticsWorker, ActivitiesWorker],
            ])
            // step 0 ok, step 1 asks for a replan, then everything is fine
            .with_replans(vec![false, true]),
    );
    let engine = engine(llm.clone());

    let session = engine.start(TripRequest::new("Lisbon")).await.unwrap();

    assert_eq!(session.replan_attempts_for(1), 1);
    assert_eq!(session.replan_attempts_for(0), 0);
    let plan = session.plan.as_ref().unwrap();
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.steps[0].agent, ActivitiesWorker);
    assert_eq!(session.current_step, 3);

    // 2 executor passes on the first plan, 3 on the second
    assert_eq!(llm.counts().executor, 5);
    assert_eq!(llm.counts().planner, 2);
}

#[tokio::test]
async fn test_after_tool_returns_to_current_steps_worker() {
    let llm = Arc::new(ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]).with_tool_rounds(1));
    let engine = engine(llm.clone());

    let mut session = Session::new(TripRequest::new("Lisbon"));
    // planner, executor, logistics worker (asks for tools)
    for _ in 0..3 {
        engine.step(&mut session).await.unwrap();
    }
    assert_eq!(session.stage, WorkflowStage::ToolDispatch(LogisticsWorker));

    // Misrouted: the cursor already points at the activities step
    session.current_step = 1;
    let next = engine.step(&mut session).await.unwrap();
    assert_eq!(next, WorkflowStage::Worker(ActivitiesWorker));
}

#[tokio::test]
async fn test_summary_includes_every_assistant_text_once() {
    let llm = Arc::new(
        ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker, LogisticsWorker]).with_tool_rounds(2),
    );
    let engine = engine(llm.clone());

    let session = engine.start(TripRequest::new("Lisbon")).await.unwrap();

    let texts: Vec<String> = session
        .conversation
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(Message::text)
        .filter(|t| !t.is_empty())
        .collect();
    assert_eq!(texts.len(), 3);

    let request = llm.last_request();
    let summary = request.messages.last().unwrap().text();
    let mut cursor = 0;
    for (i, text) in texts.iter().enumerate() {
        let entry = format!("Research {}: \n{}", i + 1, text);
        assert_eq!(summary.matches(&entry).count(), 1, "{} not exactly once", entry);
        let at = summary.find(&entry).unwrap();
        assert!(at >= cursor, "entries out of order");
        cursor = at;
    }
    assert!(!summary.contains("Research 4:"));
}

#[tokio::test]
async fn test_tool_round_cap_ends_sub_loop() {
    let llm = Arc::new(ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]).with_tool_rounds(usize::MAX));
    let engine = engine(llm.clone());
    let max_rounds = engine.config().max_tool_rounds as usize;

    let session = engine.start(TripRequest::new("Lisbon")).await.unwrap();

    assert_eq!(session.status, SessionStatus::Complete);
    let counts = llm.counts();
    // Each step: max_rounds tool turns, then one answer without tools
    assert_eq!(counts.logistics, max_rounds + 1);
    assert_eq!(counts.activities, max_rounds + 1);
    assert_eq!(counts.worker_without_tools, 2);
}

#[tokio::test]
async fn test_tool_round_cap_holds_when_model_ignores_it() {
    let llm = Arc::new(
        ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker])
            .with_tool_rounds(usize::MAX)
            .ignoring_tool_binding(),
    );
    let engine = engine(llm.clone());
    let max_rounds = engine.config().max_tool_rounds;

    let mut session = Session::new(TripRequest::new("Lisbon"));
    let mut steps = 0;
    while !session.stage.is_done() && steps < 100 {
        engine.step(&mut session).await.unwrap();
        steps += 1;
        assert!(session.tool_rounds <= max_rounds);
    }

    assert!(session.stage.is_done());
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.current_step, 2);
    let counts = llm.counts();
    assert_eq!(counts.logistics, max_rounds as usize + 1);
    assert_eq!(counts.activities, max_rounds as usize + 1);
    // The capped answers carried tool calls, and none were kept
    let answer_turns = session
        .conversation
        .iter()
        .filter(|m| m.role == Role::Assistant && !m.has_tool_calls())
        .count();
    assert_eq!(answer_turns, 2);
}

#[tokio::test]
async fn test_worker_sees_curated_context() {
    let llm = Arc::new(ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]));
    let engine = engine(llm.clone());
    let mut session = Session::new(TripRequest::new("Lisbon"));

    // planner, executor, worker
    for _ in 0..3 {
        engine.step(&mut session).await.unwrap();
    }
    let request = llm.last_request();
    assert_eq!(request.messages[0].role, Role::System);
    assert!(request.messages[0].text().starts_with("Curated destination info:\n"));
    assert_eq!(request.messages.last().unwrap().text(), session.agent_query);
}

#[tokio::test]
async fn test_search_outage_aborts_session() {
    let temp = TempDir::new().unwrap();
    let state = StateManager::spawn(temp.path().join("sessions.db")).unwrap();
    let llm = Arc::new(ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]).with_tool_rounds(1));
    let engine = engine_with(llm.clone(), Arc::new(DownSearch)).with_state(state.clone());

    let err = engine.start(TripRequest::new("Lisbon")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Tool(ToolError::Search { .. })));
    assert_eq!(llm.counts().synthesizer, 0);

    let failed = state.list_sessions(Some(SessionStatus::Failed)).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].final_answer.is_none());
    assert_eq!(failed[0].stage, WorkflowStage::ToolDispatch(LogisticsWorker));
    assert!(failed[0].error.as_deref().unwrap().contains("HTTP 503"));
}

#[tokio::test]
async fn test_checkpoints_track_progress() {
    let temp = TempDir::new().unwrap();
    let state = StateManager::spawn(temp.path().join("sessions.db")).unwrap();
    let llm = Arc::new(ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]));
    let engine = engine(llm).with_state(state.clone());

    let session = engine.start(TripRequest::new("Lisbon")).await.unwrap();

    let stored = state.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored, session);
    assert_eq!(stored.stage, WorkflowStage::Done);
}

#[tokio::test]
async fn test_run_batch_keeps_request_order() {
    let llm = Arc::new(ScriptedLlm::new(vec![LogisticsWorker, ActivitiesWorker]));
    let engine = engine(llm.clone());

    let requests: Vec<TripRequest> = ["Lisbon", "Porto", "Madeira", "Faro", "Braga"]
        .iter()
        .map(|q| TripRequest::new(*q))
        .collect();
    let results = engine.run_batch(requests, 2).await;

    let queries: Vec<String> = results
        .into_iter()
        .map(|r| r.unwrap().request.user_query)
        .collect();
    assert_eq!(queries, vec!["Lisbon", "Porto", "Madeira", "Faro", "Braga"]);
    assert_eq!(llm.counts().synthesizer, 5);
}

// =============================================================================
// Properties
// =============================================================================

fn agent_strategy() -> impl Strategy<Value = AgentKind> {
    prop_oneof![Just(LogisticsWorker), Just(ActivitiesWorker)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_n_step_plan_runs_executor_n_times(
        agents in prop::collection::vec(agent_strategy(), 2..=4),
        tool_rounds in 0usize..3,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let n = agents.len();
        let llm = Arc::new(ScriptedLlm::new(agents.clone()).with_tool_rounds(tool_rounds));
        let engine = engine(llm.clone());

        let session = runtime.block_on(engine.start(TripRequest::new("Lisbon"))).unwrap();
        let counts = llm.counts();

        prop_assert_eq!(counts.executor, n);
        prop_assert_eq!(counts.planner, 1);
        prop_assert_eq!(counts.synthesizer, 1);
        prop_assert_eq!(session.current_step, n);

        let logistics = agents.iter().filter(|a| **a == LogisticsWorker).count();
        prop_assert_eq!(counts.logistics, logistics * (tool_rounds + 1));
        prop_assert_eq!(counts.activities, (n - logistics) * (tool_rounds + 1));
    }
}
