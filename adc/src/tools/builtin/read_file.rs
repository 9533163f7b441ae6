//! read_file tool - return file contents

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Read the contents of a file from the workspace
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file from the workspace. Returns the file content as a string."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read (absolute or relative to workspace)"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "ReadFileTool::execute: called");
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };

        let full_path = ctx.resolve_path(Path::new(path));
        if !full_path.exists() {
            debug!(?full_path, "ReadFileTool::execute: file missing");
            return ToolResult::error(format!("File not found: {}", full_path.display()));
        }

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => {
                ctx.track_read(&full_path).await;
                ToolResult::success(json!({"content": content}))
            }
            Err(e) => ToolResult::error(format!("Failed to read file: {}", e)),
        }
    }
}
