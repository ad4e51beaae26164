//! write_file tool - write content to a file

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Write content to a file, creating parent directories as needed
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("path is required"),
        };
        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("content is required"),
        };

        let full_path = ctx.resolve(Path::new(path));

        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create directories: {}", e));
        }

        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        ToolResult::success(format!("Wrote {} bytes to {}", content.len(), full_path.display()))
            .with_metadata("path", json!(full_path.display().to_string()))
            .with_metadata("bytes", json!(content.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_file_basic() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = WriteFileTool
            .execute(json!({"path": "out.txt", "content": "Hello, world!"}), &ctx)
            .await;

        assert!(result.success);
        assert!(result.output.contains("13 bytes"));
        assert_eq!(fs::read_to_string(temp.path().join("out.txt")).unwrap(), "Hello, world!");
    }

    #[tokio::test]
    async fn test_write_file_creates_directories() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = WriteFileTool
            .execute(json!({"path": "nested/deep/file.txt", "content": "x"}), &ctx)
            .await;

        assert!(result.success);
        assert_eq!(fs::read_to_string(temp.path().join("nested/deep/file.txt")).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_write_file_overwrites() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "old").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = WriteFileTool.execute(json!({"path": "f.txt", "content": "new"}), &ctx).await;

        assert!(result.success);
        assert_eq!(fs::read_to_string(temp.path().join("f.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_write_file_missing_content() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = WriteFileTool.execute(json!({"path": "f.txt"}), &ctx).await;

        assert!(!result.success);
        assert!(result.error.contains("content is required"));
    }
}
