//! read_file tool - read file contents with line numbers

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

const DEFAULT_MAX_LINES: usize = 500;

/// Read a file's contents as numbered lines
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file. Returns numbered lines."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read"
                },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum lines to read (default 500)",
                    "default": DEFAULT_MAX_LINES
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("path is required"),
        };
        let max_lines = input["max_lines"].as_u64().unwrap_or(DEFAULT_MAX_LINES as u64) as usize;

        let full_path = ctx.resolve(Path::new(path));
        if !full_path.exists() {
            return ToolResult::error(format!("File not found: {}", path));
        }
        if !full_path.is_file() {
            return ToolResult::error(format!("Not a file: {}", path));
        }

        let text = match tokio::fs::read_to_string(&full_path).await {
            Ok(t) => t,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        let all_lines: Vec<&str> = text.lines().collect();
        let truncated = all_lines.len() > max_lines;
        let shown = if truncated { &all_lines[..max_lines] } else { &all_lines[..] };

        let mut output = shown
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>5} | {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");

        if truncated {
            output.push_str(&format!(
                "\n\n... (truncated at {} lines, {} total)",
                max_lines,
                all_lines.len()
            ));
        }

        ToolResult::success(output)
            .with_metadata("path", json!(full_path.display().to_string()))
            .with_metadata("lines", json!(shown.len()))
            .with_metadata("truncated", json!(truncated))
    }
}
