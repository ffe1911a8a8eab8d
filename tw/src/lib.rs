//! Tripwright - plan-and-execute travel research
//!
//! A planner turns a trip request into a short research plan. For each step
//! an executor refines the query and may ask for a new plan; a logistics or
//! activities worker answers it, calling web search as needed. A synthesizer
//! compiles everything into a markdown itinerary.
//!
//! # Modules
//!
//! - [`workflow`] - Stage machine, routers and the engine
//! - [`domain`] - Plan, trip request and session types
//! - [`llm`] - LLM client trait, OpenAI implementation, structured output
//! - [`tools`] - Web search tool for the workers
//! - [`retrieval`] - Curated destination snippets
//! - [`state`] - Session checkpointing
//! - [`prompts`] - Prompt templates
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod prompts;
pub mod retrieval;
pub mod state;
pub mod tools;
pub mod workflow;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use domain::{AgentKind, Plan, PlanStep, Session, SessionStatus, TripRequest};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use prompts::PromptLoader;
pub use retrieval::{NoRetriever, Retriever, StoreRetriever, create_retriever};
pub use state::{SessionStore, StateError, StateManager};
pub use tools::{SearchProvider, Tool, ToolContext, ToolError, ToolExecutor, ToolResult, create_search_provider};
pub use workflow::{WorkflowEngine, WorkflowError, WorkflowStage};
