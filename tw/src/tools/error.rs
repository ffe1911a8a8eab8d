//! Tool error types

use thiserror::Error;

/// Errors that end a tool call and abort the run
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Search provider {provider} failed: {message}")]
    Search { provider: String, message: String },

    #[error("Search API key not found. Set the {env} environment variable.")]
    MissingApiKey { env: String },

    #[error("Unknown search provider: '{0}'. Supported: tavily")]
    UnknownProvider(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
