//! search_files tool - recursive regex search over file contents

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{Value, json};
use std::path::Path;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolResult};

const MAX_MATCHES: usize = 100;
const MAX_FILES: usize = 500;
const MAX_FILE_BYTES: u64 = 1_000_000;

/// Search file contents with a regex, like grep -rn
pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &'static str {
        "search_files"
    }

    fn description(&self) -> &'static str {
        "Search file contents using a regex pattern. Like grep -rn."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Root directory to search (default '.')",
                    "default": "."
                },
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "file_glob": {
                    "type": "string",
                    "description": "Glob to filter files (e.g. '*.rs')",
                    "default": "*"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let pattern = match input["pattern"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("pattern is required"),
        };
        let path = input["path"].as_str().unwrap_or(".");
        let file_glob = input["file_glob"].as_str().unwrap_or("*");

        let root = ctx.resolve(Path::new(path));
        if !root.exists() {
            return ToolResult::error(format!("Path not found: {}", path));
        }

        let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Invalid regex: {}", e)),
        };
        let glob_filter = match glob::Pattern::new(file_glob) {
            Ok(g) => g,
            Err(e) => return ToolResult::error(format!("Invalid glob: {}", e)),
        };

        let mut matches = Vec::new();
        let mut files_searched = 0usize;

        // Glob-filter the walk first so the file cap counts only
        // candidate files
        let candidates = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let file_name = e.path().file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                glob_filter.matches(&file_name)
            })
            .take(MAX_FILES);

        'files: for entry in candidates {
            let file_path = entry.path();
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                continue;
            }

            files_searched += 1;
            let Ok(text) = tokio::fs::read_to_string(file_path).await else {
                continue;
            };

            for (line_no, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    let rel = file_path.strip_prefix(&root).unwrap_or(file_path);
                    matches.push(format!("  {}:{}  {}", rel.display(), line_no + 1, line.trim()));
                    if matches.len() >= MAX_MATCHES {
                        break 'files;
                    }
                }
            }
        }

        let header = format!("Searched {} files for /{}/", files_searched, pattern);
        if matches.is_empty() {
            return ToolResult::success(format!("{}\nNo matches found.", header));
        }

        ToolResult::success(format!("{}\n{} matches:\n{}", header, matches.len(), matches.join("\n")))
            .with_metadata("matches", json!(matches.len()))
    }
}
