//! list_directory tool - list directory contents with glob filtering

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

const MAX_ENTRIES: usize = 200;

/// List files and directories, optionally filtered by a glob pattern
pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List files and directories. Supports glob patterns."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path (default '.')",
                    "default": "."
                },
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern filter (default '*')",
                    "default": "*"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = input["path"].as_str().unwrap_or(".");
        let pattern = input["pattern"].as_str().unwrap_or("*");

        let dir = ctx.resolve(Path::new(path));
        if !dir.exists() {
            return ToolResult::error(format!("Directory not found: {}", path));
        }
        if !dir.is_dir() {
            return ToolResult::error(format!("Not a directory: {}", path));
        }

        let glob_expr = dir.join(pattern).to_string_lossy().to_string();
        let mut entries: Vec<_> = match glob::glob(&glob_expr) {
            Ok(paths) => paths.flatten().collect(),
            Err(e) => return ToolResult::error(format!("Invalid glob pattern: {}", e)),
        };
        entries.sort();

        let total = entries.len();
        let mut lines = Vec::new();
        for entry in entries.iter().take(MAX_ENTRIES) {
            let name = entry.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if entry.is_dir() {
                lines.push(format!("  DIR   {}", name));
            } else {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                lines.push(format!("  FILE  {} ({} bytes)", name, size));
            }
        }

        let mut header = format!("Directory: {}\n{} entries", dir.display(), total);
        if total > MAX_ENTRIES {
            header.push_str(" (showing first 200)");
        }

        ToolResult::success(format!("{}\n{}", header, lines.join("\n")))
            .with_metadata("path", json!(dir.display().to_string()))
            .with_metadata("count", json!(total))
    }
}
