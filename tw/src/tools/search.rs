//! Web search: the search collaborator and the `web_search` tool over it

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Something that can search the web
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logs and errors
    fn name(&self) -> &'static str;

    /// Return up to `k` results for `query`
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ToolError>;
}

/// Build the configured search provider
pub fn create_search_provider(config: &SearchConfig) -> Result<Arc<dyn SearchProvider>, ToolError> {
    debug!(provider = %config.provider, "create_search_provider: called");
    match config.provider.as_str() {
        "tavily" => Ok(Arc::new(TavilySearch::from_config(config)?)),
        other => Err(ToolError::UnknownProvider(other.to_string())),
    }
}

/// Tavily search API client
pub struct TavilySearch {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl TavilySearch {
    /// Create a client, reading the API key from the configured variable
    pub fn from_config(config: &SearchConfig) -> Result<Self, ToolError> {
        debug!(base_url = %config.base_url, "TavilySearch::from_config: called");
        let api_key = std::env::var(&config.api_key_env).map_err(|_| ToolError::MissingApiKey {
            env: config.api_key_env.clone(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("tripwright/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ToolError> {
        debug!(%query, k, "TavilySearch::search: called");
        let body = serde_json::json!({
            "query": query,
            "max_results": k,
            "search_depth": "basic",
        });

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(%status, "TavilySearch::search: HTTP error");
            return Err(ToolError::Search {
                provider: self.name().to_string(),
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let parsed: TavilyResponse = response.json().await?;
        let hits: Vec<SearchHit> = parsed
            .results
            .into_iter()
            .take(k)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.content,
            })
            .collect();

        debug!(hit_count = %hits.len(), "TavilySearch::search: done");
        Ok(hits)
    }
}

/// `web_search` tool: a search provider with a per-call result cap
pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        debug!(provider = %provider.name(), max_results, "WebSearchTool::new: called");
        Self {
            provider,
            max_results: max_results.max(1),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web for current travel information. Returns the top results with their URL and a content excerpt."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(session_id = %ctx.session_id, step = ctx.step, "WebSearchTool::execute: called");
        let query = match input["query"].as_str().map(str::trim) {
            Some(q) if !q.is_empty() => q,
            _ => {
                debug!("WebSearchTool::execute: missing query parameter");
                return Ok(ToolResult::error("query is required"));
            }
        };

        let hits = self.provider.search(query, self.max_results).await.inspect_err(|e| {
            warn!(session_id = %ctx.session_id, error = %e, "WebSearchTool::execute: search failed");
        })?;

        if hits.is_empty() {
            return Ok(ToolResult::success(format!("No results found for: {}", query)));
        }

        let hits: Vec<SearchHit> = hits.into_iter().take(self.max_results).collect();
        Ok(ToolResult::success(serde_json::to_string_pretty(&hits)?))
    }
}
