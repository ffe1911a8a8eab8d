//! Tripwright configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main Tripwright configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Web search configuration
    pub search: SearchConfig,

    /// Workflow limits and sampling
    pub workflow: WorkflowConfig,

    /// Destination document retrieval
    pub retrieval: RetrievalConfig,

    /// Session checkpoint storage
    pub storage: StorageConfig,

    /// Concurrency limits
    pub concurrency: ConcurrencyConfig,

    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API keys the run needs are present in the environment.
    pub fn validate(&self) -> Result<()> {
        let resolved = self.llm.resolve()?;
        if std::env::var(&resolved.api_key_env).is_err() {
            return Err(eyre!(
                "LLM API key not found. Set the {} environment variable.",
                resolved.api_key_env
            ));
        }
        if std::env::var(&self.search.api_key_env).is_err() {
            return Err(eyre!(
                "Search API key not found. Set the {} environment variable.",
                self.search.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .tripwright.yml
        let local_config = PathBuf::from(".tripwright.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/tripwright/tripwright.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tripwright").join("tripwright.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM configuration
///
/// `default` names a `provider/model` pair; the provider's connection
/// details come from `providers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Default model as "provider/model"
    pub default: String,

    /// Per-provider connection settings
    pub providers: HashMap<String, ProviderConfig>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), ProviderConfig::default());
        Self {
            default: "openai/gpt-4o-mini".to_string(),
            providers,
            max_tokens: 4096,
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    /// Resolve the default `provider/model` into concrete connection settings
    pub fn resolve(&self) -> Result<ResolvedLlmConfig> {
        tracing::debug!(default = %self.default, "LlmConfig::resolve: called");
        let (provider, model) = self
            .default
            .split_once('/')
            .ok_or_else(|| eyre!("Invalid llm.default '{}': expected provider/model", self.default))?;

        if provider.is_empty() || model.is_empty() {
            return Err(eyre!("Invalid llm.default '{}': expected provider/model", self.default));
        }

        let provider_config = self
            .providers
            .get(provider)
            .cloned()
            .ok_or_else(|| eyre!("No settings for LLM provider '{}'", provider))?;

        Ok(ResolvedLlmConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key_env: provider_config.api_key_env,
            base_url: provider_config.base_url,
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Connection settings for one LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
        }
    }
}

/// Fully resolved LLM settings handed to a client
#[derive(Debug, Clone)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl ResolvedLlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre!("API key not found. Set the {} environment variable.", self.api_key_env))
    }
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search provider (currently only "tavily" supported)
    pub provider: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "tavily".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            base_url: "https://api.tavily.com".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Workflow limits and sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Replans allowed per step; the check is `attempts <= max`
    #[serde(rename = "max-replan-attempts")]
    pub max_replan_attempts: u32,

    /// Tool-dispatch rounds allowed per step before tools are unbound
    #[serde(rename = "max-tool-rounds")]
    pub max_tool_rounds: u32,

    /// Results per web search call
    #[serde(rename = "search-max-results")]
    pub search_max_results: usize,

    /// Snippets pulled into the retrieval context
    #[serde(rename = "rag-top-k")]
    pub rag_top_k: usize,

    /// Maximum tokens per LLM call
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for planning, executing and research
    pub temperature: f32,

    /// Sampling temperature for the final itinerary
    #[serde(rename = "synthesizer-temperature")]
    pub synthesizer_temperature: f32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_replan_attempts: 2,
            max_tool_rounds: 5,
            search_max_results: 3,
            rag_top_k: destinationstore::DEFAULT_TOP_K,
            max_tokens: 4096,
            temperature: 0.0,
            synthesizer_temperature: 0.3,
        }
    }
}

/// Destination document retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Whether to consult the destination index at all
    pub enabled: bool,

    /// Index directory shared with the `ds` tool
    #[serde(rename = "store-path")]
    pub store_path: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_path: destinationstore::config::default_store_path(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding session checkpoints
    #[serde(rename = "sessions-db")]
    pub sessions_db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/tripwright on Linux)
        let sessions_db = dirs::data_dir()
            .map(|d| d.join("tripwright"))
            .unwrap_or_else(|| PathBuf::from(".tripwright"))
            .join("sessions.db");

        Self { sessions_db }
    }
}

/// Concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum sessions run at once by `tw batch`
    #[serde(rename = "max-sessions")]
    pub max_sessions: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_sessions: 4 }
    }
}
