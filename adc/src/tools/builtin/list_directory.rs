//! list_directory tool - list files and directories

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// List files and directories in a path
pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List files and directories in a given path. Returns list of entries with type (file/directory) and name."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Path to directory to list (absolute or relative to workspace, defaults to workspace root)",
                    "default": "."
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let directory = input["directory"].as_str().unwrap_or(".");
        debug!(%directory, "ListDirectoryTool::execute: called");

        let full_path = ctx.resolve_path(Path::new(directory));
        if !full_path.exists() {
            return ToolResult::error(format!("Directory not found: {}", full_path.display()));
        }

        let mut read_dir = match tokio::fs::read_dir(&full_path).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(format!("Failed to list directory: {}", e)),
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let entry_type = match entry.file_type().await {
                Ok(t) if t.is_dir() => "directory",
                Ok(_) => "file",
                Err(_) => "file",
            };
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "type": entry_type,
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        ToolResult::success(json!({"entries": entries}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_directory_entries_typed() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("file.txt"), "x").unwrap();
        fs::create_dir(temp.path().join("subdir")).unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = ListDirectoryTool.execute(json!({}), &ctx).await;

        assert!(!result.is_error);
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        let entries = parsed["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "file.txt");
        assert_eq!(entries[0]["type"], "file");
        assert_eq!(entries[1]["name"], "subdir");
        assert_eq!(entries[1]["type"], "directory");
    }

    #[tokio::test]
    async fn test_list_directory_missing_is_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = ListDirectoryTool.execute(json!({"directory": "ghost"}), &ctx).await;

        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("Directory not found"));
    }

    #[tokio::test]
    async fn test_list_directory_subdir() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/main.rs"), "fn main() {}").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = ListDirectoryTool.execute(json!({"directory": "src"}), &ctx).await;

        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["entries"][0]["name"], "main.rs");
    }
}
