//! SessionStore - SQLite persistence for session checkpoints
//!
//! One row per session. The full session is stored as JSON next to a few
//! indexed columns for listing. Writes are upserts, so the last checkpoint
//! of a session wins.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::domain::{Session, SessionStatus};

use super::StateError;

/// SQLite-backed session checkpoints
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "SessionStore::open: called");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StateError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                stage TEXT NOT NULL,
                user_query TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
            CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace a session
    pub fn upsert(&self, session: &Session) -> Result<(), StateError> {
        debug!(session_id = %session.id, status = %session.status, stage = %session.stage, "SessionStore::upsert: called");
        let data = serde_json::to_string(session)?;
        self.conn.execute(
            r#"
            INSERT INTO sessions (id, status, stage, user_query, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                stage = excluded.stage,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![
                session.id,
                session.status.to_string(),
                session.stage.to_string(),
                session.request.user_query,
                data,
                session.created_at,
                session.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a session by full id
    pub fn get(&self, id: &str) -> Result<Option<Session>, StateError> {
        debug!(%id, "SessionStore::get: called");
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM sessions WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(StateError::from))
            .transpose()
    }

    /// Sessions newest first, optionally only those with `status`
    pub fn list(&self, status: Option<SessionStatus>) -> Result<Vec<Session>, StateError> {
        debug!(?status, "SessionStore::list: called");
        let mut stmt = self.conn.prepare(
            "SELECT data FROM sessions WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![status.map(|s| s.to_string())], |row| row.get::<_, String>(0))?;

        let mut sessions = Vec::new();
        for data in rows {
            sessions.push(serde_json::from_str(&data?)?);
        }
        Ok(sessions)
    }

    /// Delete a session; returns whether it existed
    pub fn delete(&self, id: &str) -> Result<bool, StateError> {
        debug!(%id, "SessionStore::delete: called");
        let deleted = self.conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Expand a unique id prefix to the full id
    pub fn resolve_id(&self, prefix: &str) -> Result<String, StateError> {
        debug!(%prefix, "SessionStore::resolve_id: called");
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM sessions WHERE substr(id, 1, length(?1)) = ?1")?;
        let ids = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        match ids.as_slice() {
            [] => Err(StateError::NotFound(prefix.to_string())),
            [id] => Ok(id.clone()),
            _ if ids.iter().any(|id| id == prefix) => Ok(prefix.to_string()),
            _ => Err(StateError::Ambiguous {
                prefix: prefix.to_string(),
                count: ids.len(),
            }),
        }
    }
}
