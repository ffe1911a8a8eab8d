//! Workflow error types

use thiserror::Error;

use crate::llm::LlmError;
use crate::retrieval::RetrievalError;
use crate::state::StateError;
use crate::tools::ToolError;

/// Errors that end a workflow run
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Session {0} has no plan")]
    MissingPlan(String),

    #[error("Step index {step} is out of range for a {len}-step plan")]
    StepOutOfRange { step: usize, len: usize },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} already finished")]
    AlreadyFinished(String),
}
