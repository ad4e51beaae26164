//! Tool trait and result types

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::context::ToolContext;

/// A tool that can be called by the LLM through the agent loop
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the name in tool-call requests)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Schema record for a tool, serialized into backend wire formats
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of executing a tool
///
/// Tools never raise out of the agent loop: failures come back as a
/// result with `success == false` and an error string.
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub metadata: serde_json::Map<String, Value>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    /// Create a failed result
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            ..Default::default()
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Format as the message string the model sees as tool result content
    pub fn to_message(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("Error: {}", self.error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("Wrote 42 bytes");
        assert!(result.success);
        assert_eq!(result.to_message(), "Wrote 42 bytes");
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("File not found: missing.txt");
        assert!(!result.success);
        assert_eq!(result.to_message(), "Error: File not found: missing.txt");
    }

    #[test]
    fn test_tool_result_metadata() {
        let result = ToolResult::success("3 lines").with_metadata("truncated", Value::Bool(false));
        assert_eq!(result.metadata.get("truncated"), Some(&Value::Bool(false)));
    }
}
