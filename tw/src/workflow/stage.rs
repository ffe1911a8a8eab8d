//! WorkflowStage - one node of the research state machine

use serde::{Deserialize, Serialize};

use crate::domain::AgentKind;

/// The stage a session will run next
///
/// Workers and tool dispatch carry the worker they belong to, so routing
/// never goes through strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "agent")]
pub enum WorkflowStage {
    /// Produce (or replace) the research plan
    Planner,
    /// Refine the current step into a worker query, maybe ask for a replan
    Executor,
    /// Research the refined query
    Worker(AgentKind),
    /// Run the tool calls a worker asked for
    ToolDispatch(AgentKind),
    /// Move the cursor to the next plan step
    AdvanceStep,
    /// Compile the research into the itinerary
    Synthesizer,
    /// Terminal
    Done,
}

impl WorkflowStage {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planner => write!(f, "planner"),
            Self::Executor => write!(f, "executor"),
            Self::Worker(agent) => write!(f, "{}", agent),
            Self::ToolDispatch(agent) => write!(f, "tool_dispatch({})", agent),
            Self::AdvanceStep => write!(f, "advance_step"),
            Self::Synthesizer => write!(f, "synthesizer"),
            Self::Done => write!(f, "done"),
        }
    }
}
