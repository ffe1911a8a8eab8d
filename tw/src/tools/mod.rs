//! Tool system for research workers
//!
//! Workers may ask for tool calls alongside their text. The engine runs them
//! through a `ToolExecutor` and feeds the results back to the same worker.

mod context;
mod error;
mod executor;
mod search;
mod traits;

pub use context::ToolContext;
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use search::{SearchHit, SearchProvider, TavilySearch, WebSearchTool, create_search_provider};
pub use traits::{Tool, ToolResult};
