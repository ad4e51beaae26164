//! get_file_info tool - file and directory metadata

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Report metadata for a file or directory
pub struct FileInfoTool;

#[async_trait]
impl Tool for FileInfoTool {
    fn name(&self) -> &'static str {
        "get_file_info"
    }

    fn description(&self) -> &'static str {
        "Get metadata about a file or directory (size, dates, type)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to inspect"
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

        let full_path = ctx.resolve(Path::new(path));
        let meta = match tokio::fs::metadata(&full_path).await {
            Ok(m) => m,
            Err(_) => return ToolResult::error(format!("Path not found: {}", path)),
        };

        let mut info = serde_json::Map::new();
        info.insert("path".to_string(), json!(full_path.display().to_string()));
        info.insert(
            "name".to_string(),
            json!(full_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()),
        );
        info.insert(
            "type".to_string(),
            json!(if meta.is_dir() { "directory" } else { "file" }),
        );
        info.insert("size_bytes".to_string(), json!(meta.len()));

        if let Ok(modified) = meta.modified() {
            let ts: DateTime<Utc> = modified.into();
            info.insert("modified".to_string(), json!(ts.to_rfc3339()));
        }
        if let Ok(created) = meta.created() {
            let ts: DateTime<Utc> = created.into();
            info.insert("created".to_string(), json!(ts.to_rfc3339()));
        }

        if meta.is_file() {
            let extension = full_path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
            info.insert("extension".to_string(), json!(extension));
            info.insert("size_human".to_string(), json!(human_size(meta.len())));
        }

        let lines: Vec<String> = info
            .iter()
            .map(|(k, v)| format!("  {}: {}", k, v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string())))
            .collect();

        let mut result = ToolResult::success(lines.join("\n"));
        result.metadata = info;
        result
    }
}

/// Render a byte count as a human-readable size
fn human_size(nbytes: u64) -> String {
    let mut value = nbytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} TB", value)
}
