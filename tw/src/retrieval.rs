//! Retrieval context: curated destination snippets for the workers
//!
//! Fetched once per session and handed to each worker as an extra system
//! message when non-empty.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use destinationstore::DestinationStore;
use thiserror::Error;
use tracing::debug;

use crate::config::RetrievalConfig;

/// Errors from the retrieval collaborator
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Destination store error: {0}")]
    Store(String),

    #[error("Retrieval task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Something that returns pre-indexed snippets for a query
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` snippets; empty when nothing matches or no index exists
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError>;
}

/// Retriever over a `destinationstore` index on disk
pub struct StoreRetriever {
    store_path: PathBuf,
}

impl StoreRetriever {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        let store_path = store_path.into();
        debug!(store_path = %store_path.display(), "StoreRetriever::new: called");
        Self { store_path }
    }
}

#[async_trait]
impl Retriever for StoreRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        debug!(%query, k, "StoreRetriever::retrieve: called");
        if !self.store_path.exists() {
            debug!("StoreRetriever::retrieve: no index directory");
            return Ok(Vec::new());
        }

        // The store does blocking file IO
        let path = self.store_path.clone();
        let query = query.to_string();
        let snippets = tokio::task::spawn_blocking(move || {
            let store = DestinationStore::open(&path)?;
            store.retrieve(&query, k)
        })
        .await?
        .map_err(|e| RetrievalError::Store(e.to_string()))?;

        debug!(snippet_count = %snippets.len(), "StoreRetriever::retrieve: done");
        Ok(snippets.into_iter().map(|s| s.text).collect())
    }
}

/// Retriever for sessions without a document index
pub struct NoRetriever;

#[async_trait]
impl Retriever for NoRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Build the retriever the config asks for
pub fn create_retriever(config: &RetrievalConfig) -> Arc<dyn Retriever> {
    debug!(enabled = config.enabled, "create_retriever: called");
    if config.enabled {
        Arc::new(StoreRetriever::new(&config.store_path))
    } else {
        Arc::new(NoRetriever)
    }
}
