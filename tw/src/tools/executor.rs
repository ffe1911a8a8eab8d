//! ToolExecutor - runs the tool calls a worker asks for

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{ToolCall, ToolDefinition};

use super::{SearchProvider, Tool, ToolContext, ToolError, ToolResult, WebSearchTool};

/// Registry of tools keyed by name
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Executor with the research toolset: web search capped at `max_results`
    pub fn research(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        debug!(max_results, "ToolExecutor::research: called");
        let mut executor = Self::empty();
        executor.add_tool(Box::new(WebSearchTool::new(provider, max_results)));
        executor
    }

    /// Create an empty executor
    pub fn empty() -> Self {
        debug!("ToolExecutor::empty: called");
        Self { tools: HashMap::new() }
    }

    /// Add a tool to the executor
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get tool definitions for the LLM, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        debug!("ToolExecutor::definitions: called");
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool call
    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(tool_name = %tool_call.name, tool_id = %tool_call.id, session_id = %ctx.session_id, "ToolExecutor::execute: called");
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool.execute(tool_call.input.clone(), ctx).await,
            None => {
                debug!("ToolExecutor::execute: unknown tool");
                Ok(ToolResult::error(format!("Unknown tool: {}", tool_call.name)))
            }
        }
    }

    /// Execute multiple tool calls in order, one result per call
    pub async fn execute_all(
        &self,
        tool_calls: &[ToolCall],
        ctx: &ToolContext,
    ) -> Result<Vec<(String, ToolResult)>, ToolError> {
        debug!(count = %tool_calls.len(), "ToolExecutor::execute_all: called");
        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            let result = self.execute(call, ctx).await?;
            results.push((call.id.clone(), result));
        }

        Ok(results)
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Whether any tools are registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
