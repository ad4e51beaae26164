//! run_command tool - execute shell commands with a timeout

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_OUTPUT_CHARS: usize = 20_000;

/// Command substrings that are never executed
const BLOCKED_PATTERNS: &[&str] = &["rm -rf /", "mkfs", "dd if=", ":(){", "fork bomb"];

/// Execute a shell command and capture its output
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command and return its output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory (default '.')",
                    "default": "."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 30)",
                    "default": DEFAULT_TIMEOUT_SECS
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("command is required"),
        };
        let cwd = input["cwd"].as_str().unwrap_or(".");
        let timeout_secs = input["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);

        let cwd_path = ctx.resolve(Path::new(cwd));
        if !cwd_path.is_dir() {
            return ToolResult::error(format!("Working directory not found: {}", cwd));
        }

        let cmd_lower = command.to_lowercase();
        for pattern in BLOCKED_PATTERNS {
            if cmd_lower.contains(pattern) {
                return ToolResult::error(format!("Blocked dangerous command pattern: {}", pattern));
            }
        }

        debug!(%command, cwd = %cwd_path.display(), "RunCommandTool::execute: spawning");
        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&cwd_path)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("Failed to execute command: {}", e)),
            Err(_) => return ToolResult::error(format!("Command timed out after {}s", timeout_secs)),
        };

        let mut stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if stdout.len() > MAX_OUTPUT_CHARS {
            let cut: String = stdout.chars().take(MAX_OUTPUT_CHARS).collect();
            stdout = format!("{}\n... (truncated)", cut);
        }

        let mut combined = stdout;
        if !stderr.is_empty() {
            if combined.is_empty() {
                combined = format!("STDERR:\n{}", stderr);
            } else {
                combined.push_str(&format!("\n\nSTDERR:\n{}", stderr));
            }
        }
        if combined.is_empty() {
            combined = "(no output)".to_string();
        }

        let return_code = output.status.code().unwrap_or(-1);
        if output.status.success() {
            ToolResult::success(combined).with_metadata("return_code", json!(return_code))
        } else {
            ToolResult {
                success: false,
                output: combined,
                error: if stderr.is_empty() {
                    format!("Exit code: {}", return_code)
                } else {
                    stderr
                },
                metadata: serde_json::Map::new(),
            }
            .with_metadata("return_code", json!(return_code))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_command_basic() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = RunCommandTool.execute(json!({"command": "echo hello"}), &ctx).await;

        assert!(result.success);
        assert!(result.output.contains("hello"));
        assert_eq!(result.metadata["return_code"], json!(0));
    }

    #[tokio::test]
    async fn test_run_command_blocked_pattern() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = RunCommandTool.execute(json!({"command": "rm -rf / --no-preserve-root"}), &ctx).await;

        assert!(!result.success);
        assert!(result.error.contains("Blocked dangerous command pattern"));
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = RunCommandTool.execute(json!({"command": "false"}), &ctx).await;

        assert!(!result.success);
        assert_eq!(result.metadata["return_code"], json!(1));
    }

    #[tokio::test]
    async fn test_run_command_captures_stderr() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = RunCommandTool
            .execute(json!({"command": "echo out; echo err >&2"}), &ctx)
            .await;

        assert!(result.success);
        assert!(result.output.contains("out"));
        assert!(result.output.contains("STDERR:\nerr"));
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = RunCommandTool
            .execute(json!({"command": "sleep 5", "timeout": 1}), &ctx)
            .await;

        assert!(!result.success);
        assert!(result.error.contains("timed out after 1s"));
    }

    #[tokio::test]
    async fn test_run_command_in_working_dir() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "here").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = RunCommandTool.execute(json!({"command": "ls"}), &ctx).await;

        assert!(result.success);
        assert!(result.output.contains("marker.txt"));
    }
}
