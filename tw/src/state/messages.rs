//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Session, SessionStatus};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session id prefix '{prefix}' matches {count} sessions")]
    Ambiguous { prefix: String, count: usize },

    #[error("Store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    /// Insert or replace a session checkpoint
    SaveSession {
        session: Box<Session>,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    GetSession {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Session>>>,
    },
    ListSessions {
        status_filter: Option<SessionStatus>,
        reply: oneshot::Sender<StateResponse<Vec<Session>>>,
    },
    DeleteSession {
        id: String,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    /// Expand a unique id prefix to the full id
    ResolveId {
        prefix: String,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    Shutdown,
}
