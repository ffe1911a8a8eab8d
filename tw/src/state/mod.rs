//! Session checkpointing with the actor pattern
//!
//! StateManager owns the SQLite SessionStore and processes messages via
//! channels, giving concurrent sessions safe access to one database.

mod manager;
mod messages;
mod store;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
pub use store::SessionStore;
