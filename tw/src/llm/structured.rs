//! Typed structured output over a forced "submit" tool
//!
//! The schema contract is a single tool whose parameters mirror the Rust
//! type. The model is forced to call it; its arguments are deserialized
//! into the type. A reply with no such call is accepted only if its text
//! parses as the same JSON (optionally inside a fenced code block).

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, TokenUsage, ToolDefinition};

/// A type the model can be asked to produce
pub trait StructuredOutput: DeserializeOwned {
    /// Name of the submit tool, e.g. `submit_plan`
    const TOOL_NAME: &'static str;

    /// What the submit tool is for
    fn description() -> &'static str;

    /// JSON schema of the tool parameters
    fn schema() -> serde_json::Value;

    /// Post-parse checks serde cannot express
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// The submit tool definition
    fn tool_definition() -> ToolDefinition {
        ToolDefinition::new(Self::TOOL_NAME, Self::description(), Self::schema())
    }
}

/// Issue `request` with the submit tool for `T` forced, and parse the result
///
/// Any tools already on the request are replaced.
pub async fn complete_structured<T: StructuredOutput>(
    llm: &dyn LlmClient,
    mut request: CompletionRequest,
) -> Result<(T, TokenUsage), LlmError> {
    debug!(tool = T::TOOL_NAME, "complete_structured: called");
    request.tools = vec![T::tool_definition()];
    request.tool_choice = Some(T::TOOL_NAME.to_string());

    let response = llm.complete(request).await?;
    let usage = response.usage.clone();
    let value = parse_structured::<T>(&response)?;
    Ok((value, usage))
}

/// Extract a `T` from a response, preferring the submit tool call
pub fn parse_structured<T: StructuredOutput>(response: &CompletionResponse) -> Result<T, LlmError> {
    debug!(tool = T::TOOL_NAME, tool_call_count = %response.tool_calls.len(), "parse_structured: called");

    let violation = |reason: String| LlmError::SchemaViolation {
        schema: T::TOOL_NAME.to_string(),
        reason,
    };

    let value: T = if let Some(call) = response.tool_calls.iter().find(|c| c.name == T::TOOL_NAME) {
        serde_json::from_value(call.input.clone()).map_err(|e| violation(e.to_string()))?
    } else if let Some(content) = &response.content {
        debug!("parse_structured: no submit call, trying text content");
        serde_json::from_str(strip_code_fence(content)).map_err(|e| {
            warn!(tool = T::TOOL_NAME, error = %e, "parse_structured: text content is not valid output");
            violation(format!("no {} call and text is not valid JSON: {}", T::TOOL_NAME, e))
        })?
    } else {
        return Err(violation(format!("response contained no {} call", T::TOOL_NAME)));
    };

    value.validate().map_err(violation)?;
    Ok(value)
}

/// Strip a surrounding ```json ... ``` fence if present
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
