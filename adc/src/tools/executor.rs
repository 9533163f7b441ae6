//! ToolExecutor - manages tool execution for agent invocations

use std::collections::HashMap;
use tracing::debug;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{EditFileTool, ListDirectoryTool, ReadFileTool, RunBashTool, WriteFileTool};
use super::{Tool, ToolContext, ToolResult};

/// Manages the fixed workspace tool catalog
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create an executor with the five workspace tools
    pub fn standard() -> Self {
        debug!("ToolExecutor::standard: called");
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();

        tools.insert("read_file".into(), Box::new(ReadFileTool));
        tools.insert("write_file".into(), Box::new(WriteFileTool));
        tools.insert("edit_file".into(), Box::new(EditFileTool));
        tools.insert("run_bash".into(), Box::new(RunBashTool));
        tools.insert("list_directory".into(), Box::new(ListDirectoryTool));

        Self { tools }
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Tool definitions for the LLM catalog, in stable name order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let tool = &self.tools[name];
                ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    input_schema: tool.input_schema(),
                }
            })
            .collect()
    }

    /// Execute a single tool call
    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %tool_call.name, tool_id = %tool_call.id, "ToolExecutor::execute: called");
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool.execute(tool_call.input.clone(), ctx).await,
            None => {
                debug!("ToolExecutor::execute: unknown tool");
                ToolResult::error(format!("Unknown tool: {}", tool_call.name))
            }
        }
    }

    /// Execute tool calls in the order they appear
    ///
    /// Results come back in the same order; a write issued by one call is
    /// visible to the next.
    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        debug!(count = %tool_calls.len(), "ToolExecutor::execute_all: called");
        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result));
        }

        results
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}
