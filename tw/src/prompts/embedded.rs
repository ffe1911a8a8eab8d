//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Planner system prompt
pub const PLANNER: &str = include_str!("../../prompts/planner.pmt");

/// Planner human turn
pub const PLANNER_REQUEST: &str = include_str!("../../prompts/planner_request.pmt");

/// Executor system prompt
pub const EXECUTOR: &str = include_str!("../../prompts/executor.pmt");

/// Executor human turn
pub const EXECUTOR_REQUEST: &str = include_str!("../../prompts/executor_request.pmt");

/// Logistics worker system prompt
pub const LOGISTICS_WORKER: &str = include_str!("../../prompts/logistics_worker.pmt");

/// Activities worker system prompt
pub const ACTIVITIES_WORKER: &str = include_str!("../../prompts/activities_worker.pmt");

/// Synthesizer system prompt
pub const SYNTHESIZER: &str = include_str!("../../prompts/synthesizer.pmt");

/// Synthesizer human turn
pub const SYNTHESIZER_REQUEST: &str = include_str!("../../prompts/synthesizer_request.pmt");

/// Every embedded template name
pub const NAMES: &[&str] = &[
    "planner",
    "planner_request",
    "executor",
    "executor_request",
    "logistics_worker",
    "activities_worker",
    "synthesizer",
    "synthesizer_request",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let prompt = match name {
        "planner" => PLANNER,
        "planner_request" => PLANNER_REQUEST,
        "executor" => EXECUTOR,
        "executor_request" => EXECUTOR_REQUEST,
        "logistics_worker" => LOGISTICS_WORKER,
        "activities_worker" => ACTIVITIES_WORKER,
        "synthesizer" => SYNTHESIZER,
        "synthesizer_request" => SYNTHESIZER_REQUEST,
        _ => {
            debug!("get_embedded: no match found");
            return None;
        }
    };
    Some(prompt)
}
