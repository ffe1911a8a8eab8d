//! Stage handlers - each one mutates the session exactly as its stage requires
//!
//! Handlers never pick the next stage; that is the routers' job.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{AgentKind, Session};
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message, StructuredOutput, complete_structured};
use crate::prompts::PromptLoader;
use crate::retrieval::Retriever;
use crate::tools::{ToolContext, ToolExecutor};

use super::{WorkflowConfig, WorkflowError};

/// The executor's decision for the current step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorDecision {
    /// Refined query for the worker
    pub agent_query: String,
    /// Whether the plan should be thrown away and rebuilt
    pub needs_replan: bool,
    /// Why, when `needs_replan` is set
    #[serde(default)]
    pub replan_reason: String,
}

impl StructuredOutput for ExecutorDecision {
    const TOOL_NAME: &'static str = "submit_decision";

    fn description() -> &'static str {
        "Submit the refined worker query and the replan decision for the current step."
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent_query": {
                    "type": "string",
                    "description": "Refined search query for the worker"
                },
                "needs_replan": {
                    "type": "boolean",
                    "description": "True only if the plan itself must be replaced"
                },
                "replan_reason": {
                    "type": "string",
                    "description": "Why a replan is needed, or an empty string"
                }
            },
            "required": ["agent_query", "needs_replan", "replan_reason"]
        })
    }
}

/// Collaborators a stage may call
pub struct StageContext<'a> {
    pub llm: &'a dyn LlmClient,
    pub tools: &'a ToolExecutor,
    pub retriever: &'a dyn Retriever,
    pub prompts: &'a PromptLoader,
    pub config: &'a WorkflowConfig,
}

impl StageContext<'_> {
    fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String, WorkflowError> {
        self.prompts
            .render(name, context)
            .map_err(|e| WorkflowError::Prompt(e.to_string()))
    }
}

#[derive(Serialize)]
struct RequestContext<'a> {
    user_query: &'a str,
    origin_city: &'a str,
    travel_date: &'a str,
    trip_duration: &'a str,
}

impl<'a> RequestContext<'a> {
    fn of(session: &'a Session) -> Self {
        Self {
            user_query: &session.request.user_query,
            origin_city: session.request.origin_city_or_default(),
            travel_date: session.request.travel_date_or_default(),
            trip_duration: session.request.trip_duration_or_default(),
        }
    }
}

#[derive(Serialize)]
struct ExecutorContext {
    step_number: usize,
    plan_step: String,
    previous_results: String,
}

#[derive(Serialize)]
struct SynthesizerContext<'a> {
    user_query: &'a str,
    travel_date: &'a str,
    trip_duration: &'a str,
    research_summary: String,
}

/// Produce a plan, replacing any current one, and rewind to the first step
///
/// The first run also fetches the curated destination context.
pub async fn planner(ctx: &StageContext<'_>, session: &mut Session) -> Result<(), WorkflowError> {
    debug!(session_id = %session.id, "planner: called");

    if session.rag_context.is_none() {
        let snippets = ctx
            .retriever
            .retrieve(&session.request.user_query, ctx.config.rag_top_k)
            .await?;
        debug!(snippet_count = %snippets.len(), "planner: fetched retrieval context");
        session.rag_context = Some(snippets.join("\n\n"));
    }

    let request_ctx = RequestContext::of(session);
    let system = ctx.render("planner", &request_ctx)?;
    let human = ctx.render("planner_request", &request_ctx)?;
    let request = CompletionRequest::new(
        system,
        vec![Message::user(human)],
        ctx.config.max_tokens,
        ctx.config.temperature,
    );

    let (plan, usage) = complete_structured::<crate::domain::Plan>(ctx.llm, request).await?;
    info!(
        session_id = %session.id,
        destination = %plan.destination,
        step_count = plan.len(),
        "Plan created"
    );

    session.add_usage(&usage);
    session.plan = Some(plan);
    session.current_step = 0;
    session.replan_flag = false;
    session.tool_rounds = 0;
    Ok(())
}

/// Refine the current step into a worker query and decide on a replan
pub async fn executor(ctx: &StageContext<'_>, session: &mut Session) -> Result<(), WorkflowError> {
    let step = session.current_step;
    debug!(session_id = %session.id, step, "executor: called");

    let plan_step = session.current_plan_step().ok_or_else(|| match &session.plan {
        Some(plan) => WorkflowError::StepOutOfRange { step, len: plan.len() },
        None => WorkflowError::MissingPlan(session.id.clone()),
    })?;

    let executor_ctx = ExecutorContext {
        step_number: step + 1,
        plan_step: serde_json::to_string(plan_step).map_err(crate::llm::LlmError::from)?,
        previous_results: session.previous_results(),
    };
    let system = ctx.render("executor", &executor_ctx)?;
    let human = ctx.render("executor_request", &executor_ctx)?;

    let mut messages = session.conversation.clone();
    messages.push(Message::user(human));
    let request = CompletionRequest::new(system, messages, ctx.config.max_tokens, ctx.config.temperature);

    let (decision, usage) = complete_structured::<ExecutorDecision>(ctx.llm, request).await?;
    session.add_usage(&usage);
    session.agent_query = decision.agent_query;
    session.replan_flag = decision.needs_replan;

    if decision.needs_replan {
        let attempts = session.record_replan(step);
        info!(
            session_id = %session.id,
            step,
            attempts,
            reason = %decision.replan_reason,
            "Executor requested replan"
        );
    }
    Ok(())
}

/// Research the refined query, appending exactly one assistant message
///
/// Tools are bound until the step has used up its tool rounds.
pub async fn worker(ctx: &StageContext<'_>, session: &mut Session, agent: AgentKind) -> Result<(), WorkflowError> {
    debug!(session_id = %session.id, step = session.current_step, %agent, "worker: called");

    let system = ctx.render(agent.prompt_name(), &RequestContext::of(session))?;

    let mut messages = Vec::with_capacity(session.conversation.len() + 2);
    if let Some(rag) = &session.rag_context
        && !rag.is_empty()
    {
        messages.push(Message::system(format!("Curated destination info:\n{}", rag)));
    }
    messages.extend(session.conversation.iter().cloned());
    messages.push(Message::user(session.agent_query.clone()));

    let mut request = CompletionRequest::new(system, messages, ctx.config.max_tokens, ctx.config.temperature);
    let at_cap = session.tool_rounds >= ctx.config.max_tool_rounds;
    if !at_cap {
        request = request.with_tools(ctx.tools.definitions());
    } else {
        warn!(
            session_id = %session.id,
            step = session.current_step,
            tool_rounds = session.tool_rounds,
            "Tool round cap reached, asking worker to answer without tools"
        );
    }

    let mut response = ctx.llm.complete(request).await?;
    if at_cap && !response.tool_calls.is_empty() {
        // Unbound tools can still come back; the step must end here
        warn!(
            session_id = %session.id,
            step = session.current_step,
            dropped = response.tool_calls.len(),
            "Worker requested tools past the cap, dropping the calls"
        );
        response.tool_calls.clear();
    }
    debug!(
        tool_call_count = %response.tool_calls.len(),
        text_len = response.content.as_deref().map_or(0, str::len),
        "worker: response received"
    );
    session.add_usage(&response.usage);
    session.conversation.push(response.to_assistant_message());
    Ok(())
}

/// Run every tool call on the last message, appending one result per call in order
pub async fn tool_dispatch(ctx: &StageContext<'_>, session: &mut Session) -> Result<(), WorkflowError> {
    let calls = session.last_message().map(Message::tool_calls).unwrap_or_default();
    debug!(session_id = %session.id, call_count = %calls.len(), "tool_dispatch: called");

    let tool_ctx = ToolContext::new(&session.id, session.current_step);
    let results = ctx.tools.execute_all(&calls, &tool_ctx).await?;
    for (call_id, result) in results {
        session
            .conversation
            .push(Message::tool_result(call_id, result.content, result.is_error));
    }
    session.tool_rounds += 1;
    Ok(())
}

/// Move the cursor to the next plan step
pub fn advance_step(session: &mut Session) {
    debug!(session_id = %session.id, step = session.current_step, "advance_step: called");
    session.current_step += 1;
    session.tool_rounds = 0;
}

/// Compile the research into the final itinerary
pub async fn synthesizer(ctx: &StageContext<'_>, session: &mut Session) -> Result<(), WorkflowError> {
    debug!(session_id = %session.id, "synthesizer: called");

    let synth_ctx = SynthesizerContext {
        user_query: &session.request.user_query,
        travel_date: session.request.travel_date_or_default(),
        trip_duration: session.request.trip_duration_or_default(),
        research_summary: session.research_summary(),
    };
    let system = ctx.render("synthesizer", &synth_ctx)?;
    let human = ctx.render("synthesizer_request", &synth_ctx)?;

    let mut messages = session.conversation.clone();
    messages.push(Message::user(human));
    let request = CompletionRequest::new(system, messages, ctx.config.max_tokens, ctx.config.synthesizer_temperature);

    let response = ctx.llm.complete(request).await?;
    session.add_usage(&response.usage);
    let answer = match response.content {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(LlmError::InvalidResponse("synthesizer returned no itinerary text".to_string()).into());
        }
    };
    info!(session_id = %session.id, answer_len = answer.len(), "Itinerary synthesized");
    session.final_answer = Some(answer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Plan, PlanStep, TripRequest};
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, ContentBlock, LlmError, MessageContent, Role, ToolCall};
    use crate::retrieval::{NoRetriever, RetrievalError};
    use crate::tools::{SearchHit, SearchProvider, ToolError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedSearch;

    #[async_trait]
    impl SearchProvider for FixedSearch {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn search(&self, query: &str, _k: usize) -> Result<Vec<SearchHit>, ToolError> {
            Ok(vec![SearchHit {
                title: query.to_string(),
                url: "https://example.com".to_string(),
                content: format!("about {}", query),
            }])
        }
    }

    struct FixedRetriever(Vec<String>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<String>, RetrievalError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        tools: ToolExecutor,
        prompts: PromptLoader,
        config: WorkflowConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tools: ToolExecutor::research(Arc::new(FixedSearch), 3),
                prompts: PromptLoader::embedded_only(),
                config: WorkflowConfig::default(),
            }
        }

        fn ctx<'a>(&'a self, llm: &'a dyn LlmClient, retriever: &'a dyn Retriever) -> StageContext<'a> {
            StageContext {
                llm,
                tools: &self.tools,
                retriever,
                prompts: &self.prompts,
                config: &self.config,
            }
        }
    }

    fn plan_json() -> serde_json::Value {
        serde_json::json!({
            "destination": "Lisbon",
            "trip_summary": "Four days in Lisbon",
            "steps": [
                {"step": 1, "agent": "logistics_worker", "query": "flights to Lisbon", "description": "Getting there"},
                {"step": 2, "agent": "activities_worker", "query": "things to do in Lisbon", "description": "What to do"}
            ]
        })
    }

    fn planned_session() -> Session {
        let mut session = Session::new(TripRequest::new("4 days in Lisbon").with_duration("4"));
        session.plan = Some(serde_json::from_value::<Plan>(plan_json()).unwrap());
        session.rag_context = Some(String::new());
        session
    }

    fn decision(query: &str, replan: bool) -> CompletionResponse {
        CompletionResponse::tool_use(vec![ToolCall::new(
            "d1",
            "submit_decision",
            serde_json::json!({"agent_query": query, "needs_replan": replan, "replan_reason": ""}),
        )])
    }

    #[tokio::test]
    async fn test_planner_replaces_plan_and_rewinds() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![CompletionResponse::tool_use(vec![ToolCall::new(
            "p1",
            "submit_plan",
            plan_json(),
        )])]);
        let retriever = FixedRetriever(vec!["Trams".to_string(), "Fado".to_string()]);
        let ctx = fixture.ctx(&llm, &retriever);

        let mut session = Session::new(TripRequest::new("4 days in Lisbon"));
        session.current_step = 1;
        session.replan_flag = true;
        session.tool_rounds = 2;

        planner(&ctx, &mut session).await.unwrap();

        assert_eq!(session.plan.as_ref().unwrap().len(), 2);
        assert_eq!(session.current_step, 0);
        assert!(!session.replan_flag);
        assert_eq!(session.tool_rounds, 0);
        assert_eq!(session.rag_context.as_deref(), Some("Trams\n\nFado"));

        let request = &llm.requests()[0];
        assert_eq!(request.forced_tool(), Some("submit_plan"));
        let human = request.messages[0].text();
        assert!(human.starts_with("4 days in Lisbon"));
        assert!(human.contains("Travel date: not specified"));
    }

    #[tokio::test]
    async fn test_planner_schema_violation_is_fatal() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![CompletionResponse::text("Sure! Here's a plan: go to Lisbon.")]);
        let ctx = fixture.ctx(&llm, &NoRetriever);

        let mut session = Session::new(TripRequest::new("Lisbon"));
        let err = planner(&ctx, &mut session).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Llm(LlmError::SchemaViolation { .. })));
        assert!(session.plan.is_none());
    }

    #[tokio::test]
    async fn test_executor_sets_query_and_counts_replans() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![decision("TAP flights LIS", false), decision("retry", true)]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = planned_session();

        executor(&ctx, &mut session).await.unwrap();
        assert_eq!(session.agent_query, "TAP flights LIS");
        assert!(!session.replan_flag);
        assert!(session.replan_attempts.is_empty());

        executor(&ctx, &mut session).await.unwrap();
        assert!(session.replan_flag);
        assert_eq!(session.replan_attempts_for(0), 1);

        let human = llm.requests()[0].messages.last().unwrap().text();
        assert!(human.starts_with("Current plan step 1:\n{"));
        assert!(human.contains("\"agent\":\"logistics_worker\""));
        assert!(human.ends_with("Previous results:\nNo previous results yet."));
    }

    #[tokio::test]
    async fn test_executor_without_plan_is_error() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = Session::new(TripRequest::new("Lisbon"));

        let err = executor(&ctx, &mut session).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingPlan(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_message_layout() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![CompletionResponse::text("TAP flies daily.")]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = planned_session();
        session.rag_context = Some("Lisbon is hilly.".to_string());
        session.agent_query = "flights to Lisbon".to_string();
        session.conversation.push(Message::assistant("earlier"));

        worker(&ctx, &mut session, AgentKind::LogisticsWorker).await.unwrap();

        let request = &llm.requests()[0];
        assert!(request.system_prompt.contains("travel logistics"));
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].text(), "Curated destination info:\nLisbon is hilly.");
        assert_eq!(request.messages[1].text(), "earlier");
        assert_eq!(request.messages[2].role, Role::User);
        assert_eq!(request.messages[2].text(), "flights to Lisbon");
        assert_eq!(request.tools.len(), 1);
        assert!(request.forced_tool().is_none());

        // Only the response is appended, not the query turn
        assert_eq!(session.conversation.len(), 2);
        assert_eq!(session.last_message().unwrap().text(), "TAP flies daily.");
    }

    #[tokio::test]
    async fn test_worker_unbinds_tools_at_round_cap() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![CompletionResponse::text("done")]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = planned_session();
        session.tool_rounds = fixture.config.max_tool_rounds;

        worker(&ctx, &mut session, AgentKind::ActivitiesWorker).await.unwrap();

        let request = &llm.requests()[0];
        assert!(request.tools.is_empty());
        // Empty retrieval context adds no system message
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_worker_drops_tool_calls_past_round_cap() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![CompletionResponse::tool_use(vec![ToolCall::new(
            "late",
            "web_search",
            serde_json::json!({"query": "more Lisbon"}),
        )])]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = planned_session();
        session.tool_rounds = fixture.config.max_tool_rounds;

        worker(&ctx, &mut session, AgentKind::LogisticsWorker).await.unwrap();

        let last = session.last_message().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(!last.has_tool_calls());
        assert_eq!(
            crate::workflow::router::should_use_tools(&session).unwrap(),
            crate::workflow::WorkflowStage::AdvanceStep
        );
    }

    #[tokio::test]
    async fn test_tool_dispatch_appends_results_in_order() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = planned_session();
        session.conversation.push(
            CompletionResponse::tool_use(vec![
                ToolCall::new("a", "web_search", serde_json::json!({"query": "Belém"})),
                ToolCall::new("b", "web_search", serde_json::json!({"query": "Sintra"})),
            ])
            .to_assistant_message(),
        );

        tool_dispatch(&ctx, &mut session).await.unwrap();

        assert_eq!(session.conversation.len(), 3);
        assert_eq!(session.tool_rounds, 1);
        let results: Vec<(String, String)> = session.conversation[1..]
            .iter()
            .map(|m| {
                assert_eq!(m.role, Role::Tool);
                match &m.content {
                    MessageContent::Blocks(blocks) => match &blocks[0] {
                        ContentBlock::ToolResult { tool_use_id, content, .. } => (tool_use_id.clone(), content.clone()),
                        other => panic!("unexpected block {:?}", other),
                    },
                    other => panic!("unexpected content {:?}", other),
                }
            })
            .collect();
        assert_eq!(results[0].0, "a");
        assert!(results[0].1.contains("Belém"));
        assert_eq!(results[1].0, "b");
        assert!(results[1].1.contains("Sintra"));
    }

    #[test]
    fn test_advance_step() {
        let mut session = planned_session();
        session.tool_rounds = 3;
        advance_step(&mut session);
        assert_eq!(session.current_step, 1);
        assert_eq!(session.tool_rounds, 0);
    }

    #[tokio::test]
    async fn test_synthesizer_sets_final_answer() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![CompletionResponse::text("# Trip Overview\nLisbon")]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = planned_session();
        session.conversation.push(Message::assistant("Flights"));
        session.conversation.push(Message::assistant("Trams"));

        synthesizer(&ctx, &mut session).await.unwrap();

        assert_eq!(session.final_answer.as_deref(), Some("# Trip Overview\nLisbon"));
        let request = &llm.requests()[0];
        assert_eq!(request.temperature, 0.3);
        assert!(request.system_prompt.contains("Trip duration: 4"));
        assert_eq!(
            request.messages.last().unwrap().text(),
            "Create a complete travel itinerary for: 4 days in Lisbon\n\nBased on this research:\nResearch 1: \nFlights\n\nResearch 2: \nTrams"
        );
    }

    #[tokio::test]
    async fn test_synthesizer_without_text_is_error() {
        let fixture = Fixture::new();
        let llm = MockLlmClient::new(vec![CompletionResponse::text("  \n")]);
        let ctx = fixture.ctx(&llm, &NoRetriever);
        let mut session = planned_session();
        session.conversation.push(Message::assistant("Flights"));

        let err = synthesizer(&ctx, &mut session).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Llm(LlmError::InvalidResponse(_))));
        assert!(session.final_answer.is_none());
    }

    #[test]
    fn test_plan_step_json_shape() {
        let step = PlanStep {
            step: 1,
            agent: AgentKind::LogisticsWorker,
            query: "q".to_string(),
            description: "d".to_string(),
        };
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(json, r#"{"step":1,"agent":"logistics_worker","query":"q","description":"d"}"#);
    }
}
