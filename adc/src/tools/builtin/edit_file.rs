//! edit_file tool - replace an exact substring in a file

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Replace an exact, unique occurrence of a string in a file
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Edit an existing file by replacing old_string with new_string. The old_string must match exactly (including whitespace)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to edit (absolute or relative to workspace)"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact string to find in the file (must match exactly)"
                },
                "new_string": {
                    "type": "string",
                    "description": "String to replace old_string with"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(path = ?input["file_path"], "EditFileTool::execute: called");
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };
        let old_string = match input["old_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("old_string is required"),
        };
        let new_string = match input["new_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("new_string is required"),
        };

        let full_path = ctx.resolve_path(Path::new(path));
        if !full_path.exists() {
            return ToolResult::error(format!("File not found: {}", full_path.display()));
        }

        // Must read before editing
        if !ctx.was_read(&full_path).await {
            debug!("EditFileTool::execute: file not read before editing");
            return ToolResult::error("Must read before editing. Read the file first to see current content.");
        }

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        if !content.contains(old_string) {
            let preview: String = old_string.chars().take(100).collect();
            return ToolResult::error(format!("String not found in file: {}...", preview));
        }

        let count = content.matches(old_string).count();
        if count > 1 {
            return ToolResult::error(format!(
                "old_string found {} times. Provide more surrounding context to make it unique.",
                count
            ));
        }

        // Exact unique match; replace the first (only) occurrence
        let new_content = content.replacen(old_string, new_string, 1);
        match tokio::fs::write(&full_path, &new_content).await {
            Ok(()) => ToolResult::success(json!({"success": true, "path": full_path.display().to_string()})),
            Err(e) => ToolResult::error(format!("Failed to write file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    async fn setup_and_read(temp: &tempfile::TempDir, filename: &str, content: &str) -> ToolContext {
        let file_path = temp.path().join(filename);
        fs::write(&file_path, content).unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf());
        ctx.track_read(&file_path).await;
        ctx
    }

    #[tokio::test]
    async fn test_edit_file_basic() {
        let temp = tempdir().unwrap();
        let ctx = setup_and_read(&temp, "test.txt", "hello world").await;

        let result = EditFileTool
            .execute(
                json!({"file_path": "test.txt", "old_string": "world", "new_string": "rust"}),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        assert_eq!(fs::read_to_string(temp.path().join("test.txt")).unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn test_edit_file_without_read_fails() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "hello world").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = EditFileTool
            .execute(
                json!({"file_path": "test.txt", "old_string": "world", "new_string": "rust"}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("Must read before editing"));
    }

    #[tokio::test]
    async fn test_edit_file_missing_file() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = EditFileTool
            .execute(
                json!({"file_path": "ghost.txt", "old_string": "a", "new_string": "b"}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("File not found"));
    }

    #[tokio::test]
    async fn test_edit_file_string_not_found() {
        let temp = tempdir().unwrap();
        let ctx = setup_and_read(&temp, "test.txt", "hello world").await;

        let result = EditFileTool
            .execute(
                json!({"file_path": "test.txt", "old_string": "absent", "new_string": "x"}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("String not found"));
    }

    #[tokio::test]
    async fn test_edit_file_ambiguous_match_rejected() {
        let temp = tempdir().unwrap();
        let ctx = setup_and_read(&temp, "test.txt", "hello hello hello").await;

        let result = EditFileTool
            .execute(
                json!({"file_path": "test.txt", "old_string": "hello", "new_string": "hi"}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("3 times"));
        // File unchanged
        assert_eq!(fs::read_to_string(temp.path().join("test.txt")).unwrap(), "hello hello hello");
    }
}
