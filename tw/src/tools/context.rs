//! ToolContext - execution context for tools

use tracing::debug;

/// Scopes a tool call to one step of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    /// Session the call belongs to
    pub session_id: String,

    /// Zero-based plan step the call was issued from
    pub step: usize,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, step: usize) -> Self {
        let session_id = session_id.into();
        debug!(%session_id, step, "ToolContext::new: called");
        Self { session_id, step }
    }
}
