//! write_file tool - write content to a file

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Write content to a workspace file, creating parent directories
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file in the workspace. Creates the file if it doesn't exist, overwrites if it does. Creates parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to write (absolute or relative to workspace)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(path = ?input["file_path"], "WriteFileTool::execute: called");
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };
        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("content is required"),
        };

        let full_path = ctx.resolve_path(Path::new(path));

        // Directory creation, then write; partial failures are reported
        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create parent directories: {}", e));
        }

        match tokio::fs::write(&full_path, content).await {
            Ok(()) => ToolResult::success(json!({"success": true, "path": full_path.display().to_string()})),
            Err(e) => ToolResult::error(format!("Failed to write file: {}", e)),
        }
    }
}
