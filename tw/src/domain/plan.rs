//! Research plan produced by the planner stage

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::StructuredOutput;

/// Which research worker handles a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Flights, weather, visas, accommodation, safety
    #[serde(alias = "web_researcher")]
    LogisticsWorker,
    /// Attractions, food, culture, day plans
    #[serde(alias = "activities_researcher")]
    ActivitiesWorker,
}

impl AgentKind {
    /// Prompt template name for this worker
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Self::LogisticsWorker => "logistics_worker",
            Self::ActivitiesWorker => "activities_worker",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prompt_name())
    }
}

/// One research step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1-based step number
    pub step: u32,
    /// Worker assigned to the step
    pub agent: AgentKind,
    /// Query handed to the worker
    pub query: String,
    /// What the step researches
    pub description: String,
}

/// The structured research plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub destination: String,
    pub trip_summary: String,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Step at a zero-based cursor
    pub fn step(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl StructuredOutput for Plan {
    const TOOL_NAME: &'static str = "submit_plan";

    fn description() -> &'static str {
        "Submit the research plan for this trip. Call this exactly once."
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "destination": {
                    "type": "string",
                    "description": "Travel destination"
                },
                "trip_summary": {
                    "type": "string",
                    "description": "Brief trip summary"
                },
                "steps": {
                    "type": "array",
                    "minItems": 2,
                    "maxItems": 4,
                    "description": "Ordered research steps",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step": { "type": "integer", "description": "Step number, starting at 1" },
                            "agent": {
                                "type": "string",
                                "enum": ["logistics_worker", "activities_worker"],
                                "description": "Worker that executes this step"
                            },
                            "query": { "type": "string", "description": "Query to pass to the worker" },
                            "description": { "type": "string", "description": "What this step researches" }
                        },
                        "required": ["step", "agent", "query", "description"]
                    }
                }
            },
            "required": ["destination", "trip_summary", "steps"]
        })
    }

    /// The 2-4 step range is a prompt contract; only an empty plan is unusable
    fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("plan has no steps".to_string());
        }
        if !(2..=4).contains(&self.steps.len()) {
            warn!(step_count = self.steps.len(), "Plan::validate: step count outside 2-4, accepting");
        }
        Ok(())
    }
}
