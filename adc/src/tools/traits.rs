//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value;

use super::context::ToolContext;

/// A tool that can be called by the LLM
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches LLM tool_use name)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Result of a tool execution
///
/// `content` is always a JSON string; the model receives it verbatim as
/// the tool_result payload.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result carrying a JSON payload
    pub fn success(payload: Value) -> Self {
        Self {
            content: payload.to_string(),
            is_error: false,
        }
    }

    /// A structured error object `{"error": message}`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::json!({"error": message.into()}).to_string(),
            is_error: true,
        }
    }
}
