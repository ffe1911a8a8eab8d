//! StateManager - actor that owns the SessionStore
//!
//! Processes commands via channels so many concurrent sessions can
//! checkpoint through one SQLite connection.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::domain::{Session, SessionStatus};

use super::messages::{StateCommand, StateError, StateResponse};
use super::store::SessionStore;

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Open the store at `db_path` and spawn the actor
    pub fn spawn(db_path: impl AsRef<Path>) -> Result<Self, StateError> {
        debug!(db_path = %db_path.as_ref().display(), "StateManager::spawn: called");
        let store = SessionStore::open(db_path.as_ref())?;
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(actor_loop(store, rx));

        info!(db_path = %db_path.as_ref().display(), "StateManager spawned");
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Checkpoint a session (last writer wins)
    pub async fn save_session(&self, session: Session) -> StateResponse<()> {
        debug!(session_id = %session.id, stage = %session.stage, "save_session: called");
        self.request(|reply| StateCommand::SaveSession {
            session: Box::new(session),
            reply,
        })
        .await
    }

    /// Get a session by full id
    pub async fn get_session(&self, id: &str) -> StateResponse<Option<Session>> {
        debug!(%id, "get_session: called");
        self.request(|reply| StateCommand::GetSession {
            id: id.to_string(),
            reply,
        })
        .await
    }

    /// Get a session by id or unique id prefix
    pub async fn find_session(&self, id_or_prefix: &str) -> StateResponse<Session> {
        debug!(%id_or_prefix, "find_session: called");
        let id = self.resolve_id(id_or_prefix).await?;
        self.get_session(&id).await?.ok_or(StateError::NotFound(id))
    }

    /// Sessions newest first, optionally filtered by status
    pub async fn list_sessions(&self, status_filter: Option<SessionStatus>) -> StateResponse<Vec<Session>> {
        debug!(?status_filter, "list_sessions: called");
        self.request(|reply| StateCommand::ListSessions { status_filter, reply })
            .await
    }

    /// Delete a session; returns whether it existed
    pub async fn delete_session(&self, id: &str) -> StateResponse<bool> {
        debug!(%id, "delete_session: called");
        self.request(|reply| StateCommand::DeleteSession {
            id: id.to_string(),
            reply,
        })
        .await
    }

    /// Expand a unique id prefix to the full id
    pub async fn resolve_id(&self, prefix: &str) -> StateResponse<String> {
        debug!(%prefix, "resolve_id: called");
        self.request(|reply| StateCommand::ResolveId {
            prefix: prefix.to_string(),
            reply,
        })
        .await
    }

    /// Stop the actor; pending commands already queued are still handled
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

async fn actor_loop(store: SessionStore, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("actor_loop: called");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::SaveSession { session, reply } => {
                debug!(session_id = %session.id, "actor_loop: SaveSession command");
                let _ = reply.send(store.upsert(&session));
            }

            StateCommand::GetSession { id, reply } => {
                debug!(%id, "actor_loop: GetSession command");
                let _ = reply.send(store.get(&id));
            }

            StateCommand::ListSessions { status_filter, reply } => {
                debug!(?status_filter, "actor_loop: ListSessions command");
                let _ = reply.send(store.list(status_filter));
            }

            StateCommand::DeleteSession { id, reply } => {
                debug!(%id, "actor_loop: DeleteSession command");
                let _ = reply.send(store.delete(&id));
            }

            StateCommand::ResolveId { prefix, reply } => {
                debug!(%prefix, "actor_loop: ResolveId command");
                let _ = reply.send(store.resolve_id(&prefix));
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
