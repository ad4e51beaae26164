//! Backend wire dialects for tool calling
//!
//! Each LLM API speaks its own dialect for tool schemas, tool-call
//! requests, and tool results. `ToolFormatter` adapts the tool registry
//! to one of four dialects: Ollama-native, OpenAI-native, Claude-native,
//! or a generic `<tool_call>` text fallback for models without native
//! tool support.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::tools::ToolDefinition;

static TOOL_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>").expect("valid tool call regex"));

/// A tool call parsed from a model response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Output of `format_tools`: native schemas or a textual tool manual
///
/// The generic dialect has no schema slot on the wire; it returns a
/// manual to splice into the system prompt instead.
#[derive(Debug, Clone)]
pub enum FormattedTools {
    Schemas(Value),
    Manual(String),
}

/// Tool-calling dialect adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolFormatter {
    Ollama,
    OpenAi,
    Claude,
    #[default]
    Generic,
}

impl ToolFormatter {
    /// Pick the formatter for a backend kind name; unknown kinds fall
    /// back to the generic dialect
    pub fn for_backend(backend: &str) -> Self {
        match backend.to_lowercase().as_str() {
            "ollama" => Self::Ollama,
            "openai" => Self::OpenAi,
            "claude" => Self::Claude,
            _ => Self::Generic,
        }
    }

    /// Convert tool definitions to the backend-specific format
    pub fn format_tools(&self, tools: &[ToolDefinition]) -> FormattedTools {
        match self {
            Self::Ollama | Self::OpenAi => FormattedTools::Schemas(Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            },
                        })
                    })
                    .collect(),
            )),
            Self::Claude => FormattedTools::Schemas(Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            )),
            Self::Generic => FormattedTools::Manual(tool_manual(tools)),
        }
    }

    /// Extract tool calls from a model response
    pub fn parse_tool_calls(&self, response: &Value) -> Vec<ParsedToolCall> {
        match self {
            Self::Ollama => parse_function_calls(response["message"]["tool_calls"].as_array()),
            Self::OpenAi => {
                let mut calls = Vec::new();
                if let Some(choices) = response["choices"].as_array() {
                    for choice in choices {
                        calls.extend(parse_function_calls(choice["message"]["tool_calls"].as_array()));
                    }
                }
                calls
            }
            Self::Claude => {
                let mut calls = Vec::new();
                if let Some(blocks) = response["content"].as_array() {
                    for block in blocks {
                        if block["type"] == "tool_use"
                            && let Some(name) = block["name"].as_str()
                        {
                            calls.push(ParsedToolCall {
                                name: name.to_string(),
                                arguments: as_object(&block["input"]),
                            });
                        }
                    }
                }
                calls
            }
            Self::Generic => parse_text_calls(&generic_response_text(response)),
        }
    }

    /// Shape a tool execution result as a conversation message
    pub fn format_tool_result(&self, tool_name: &str, result: &str) -> Value {
        match self {
            Self::Ollama => json!({
                "role": "tool",
                "content": result,
            }),
            Self::OpenAi => json!({
                "role": "tool",
                "tool_call_id": "",
                "content": result,
            }),
            Self::Claude => json!({
                "type": "tool_result",
                "tool_use_id": "",
                "content": result,
            }),
            Self::Generic => json!({
                "role": "user",
                "content": format!("<tool_result name=\"{}\">\n{}\n</tool_result>", tool_name, result),
            }),
        }
    }
}

/// Extract visible text from any dialect's response shape
pub fn extract_text(response: &Value) -> String {
    // Ollama /api/chat
    if let Some(content) = response["message"]["content"].as_str()
        && !content.is_empty()
    {
        return content.to_string();
    }

    // Generate-style plain response
    if let Some(text) = response["response"].as_str() {
        return text.to_string();
    }

    // OpenAI chat completions
    if let Some(choices) = response["choices"].as_array()
        && let Some(first) = choices.first()
    {
        return first["message"]["content"].as_str().unwrap_or_default().to_string();
    }

    // Claude content blocks
    if let Some(blocks) = response["content"].as_array() {
        let texts: Vec<&str> = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();
        return texts.join("\n");
    }

    String::new()
}

/// Parse `{function: {name, arguments}}` entries shared by the Ollama
/// and OpenAI dialects; string-encoded arguments are JSON-parsed with an
/// empty-map fallback
fn parse_function_calls(tool_calls: Option<&Vec<Value>>) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    let Some(tool_calls) = tool_calls else {
        return calls;
    };

    for tc in tool_calls {
        let func = &tc["function"];
        let Some(name) = func["name"].as_str().filter(|n| !n.is_empty()) else {
            continue;
        };

        let arguments = match &func["arguments"] {
            Value::Object(map) => map.clone(),
            Value::String(s) => serde_json::from_str::<Value>(s)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default(),
            _ => Map::new(),
        };

        calls.push(ParsedToolCall {
            name: name.to_string(),
            arguments,
        });
    }
    calls
}

/// Parse `<tool_call>{json}</tool_call>` blocks from plain text
fn parse_text_calls(text: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    for captures in TOOL_CALL_RE.captures_iter(text) {
        let Ok(data) = serde_json::from_str::<Value>(&captures[1]) else {
            continue;
        };
        if let Some(name) = data["name"].as_str().filter(|n| !n.is_empty()) {
            calls.push(ParsedToolCall {
                name: name.to_string(),
                arguments: as_object(&data["arguments"]),
            });
        }
    }
    calls
}

/// Text a generic-dialect response carries its tool calls in
fn generic_response_text(response: &Value) -> String {
    if let Some(content) = response["message"]["content"].as_str() {
        if !content.is_empty() {
            return content.to_string();
        }
    } else if let Some(message) = response["message"].as_str() {
        return message.to_string();
    }
    response["response"].as_str().unwrap_or_default().to_string()
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Build the system-prompt section describing available tools
fn tool_manual(tools: &[ToolDefinition]) -> String {
    let mut lines = vec![
        "You have access to the following tools. To use a tool, output a <tool_call> block \
         with a JSON object containing 'name' and 'arguments'."
            .to_string(),
        String::new(),
        "Available tools:".to_string(),
    ];

    for tool in tools {
        lines.push(format!("\n  {}: {}", tool.name, tool.description));

        let props = tool.parameters["properties"].as_object().cloned().unwrap_or_default();
        let required: Vec<&str> = tool.parameters["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        if !props.is_empty() {
            lines.push("  Parameters:".to_string());
            for (pname, pschema) in &props {
                let req = if required.contains(&pname.as_str()) { " (required)" } else { "" };
                let desc = pschema["description"].as_str().unwrap_or_default();
                lines.push(format!("    - {}: {}{}", pname, desc, req));
            }
        }
    }

    lines.extend([
        String::new(),
        "Example tool call:".to_string(),
        r#"<tool_call>{"name": "read_file", "arguments": {"path": "src/main.rs"}}</tool_call>"#.to_string(),
        String::new(),
        "After receiving tool results, continue your analysis. You may call multiple tools in sequence.".to_string(),
    ]);

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "read_file".to_string(),
            description: "Read a file".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to the file"}
                },
                "required": ["path"]
            }),
        }]
    }

    #[test]
    fn test_ollama_format_tools() {
        let FormattedTools::Schemas(schemas) = ToolFormatter::Ollama.format_tools(&defs()) else {
            panic!("Expected schemas");
        };
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["function"]["name"], "read_file");
        assert_eq!(schemas[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_claude_format_tools() {
        let FormattedTools::Schemas(schemas) = ToolFormatter::Claude.format_tools(&defs()) else {
            panic!("Expected schemas");
        };
        assert_eq!(schemas[0]["name"], "read_file");
        assert!(schemas[0]["input_schema"].is_object());
        assert!(schemas[0].get("type").is_none());
    }

    #[test]
    fn test_generic_format_tools_is_manual() {
        let FormattedTools::Manual(manual) = ToolFormatter::Generic.format_tools(&defs()) else {
            panic!("Expected manual");
        };
        assert!(manual.contains("read_file: Read a file"));
        assert!(manual.contains("- path: Path to the file (required)"));
        assert!(manual.contains("<tool_call>"));
    }

    #[test]
    fn test_ollama_parse_round_trip() {
        let response = json!({
            "message": {
                "content": "",
                "tool_calls": [
                    {"function": {"name": "read_file", "arguments": {"path": "a.rs"}}}
                ]
            }
        });

        let calls = ToolFormatter::Ollama.parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], json!("a.rs"));
    }

    #[test]
    fn test_ollama_parse_string_arguments() {
        let response = json!({
            "message": {
                "tool_calls": [
                    {"function": {"name": "read_file", "arguments": "{\"path\": \"b.rs\"}"}}
                ]
            }
        });

        let calls = ToolFormatter::Ollama.parse_tool_calls(&response);
        assert_eq!(calls[0].arguments["path"], json!("b.rs"));
    }

    #[test]
    fn test_ollama_parse_bad_string_arguments_falls_back_to_empty() {
        let response = json!({
            "message": {
                "tool_calls": [
                    {"function": {"name": "read_file", "arguments": "{not json"}}
                ]
            }
        });

        let calls = ToolFormatter::Ollama.parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn test_openai_parse_round_trip() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"function": {"name": "run_command", "arguments": "{\"command\": \"ls\"}"}}
                    ]
                }
            }]
        });

        let calls = ToolFormatter::OpenAi.parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "run_command");
        assert_eq!(calls[0].arguments["command"], json!("ls"));
    }

    #[test]
    fn test_claude_parse_round_trip() {
        let response = json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "tu_1", "name": "read_file", "input": {"path": "c.rs"}}
            ]
        });

        let calls = ToolFormatter::Claude.parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], json!("c.rs"));
    }

    #[test]
    fn test_generic_parse_round_trip() {
        let response = json!({
            "message": {
                "content": "I'll read it.\n<tool_call>{\"name\": \"read_file\", \"arguments\": {\"path\": \"d.rs\"}}</tool_call>"
            }
        });

        let calls = ToolFormatter::Generic.parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], json!("d.rs"));
    }

    #[test]
    fn test_generic_parse_skips_invalid_json() {
        let response = json!({
            "response": "<tool_call>{broken}</tool_call> then <tool_call>{\"name\": \"x\", \"arguments\": {}}</tool_call>"
        });

        let calls = ToolFormatter::Generic.parse_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "x");
    }

    #[test]
    fn test_format_tool_result_shapes() {
        let ollama = ToolFormatter::Ollama.format_tool_result("read_file", "contents");
        assert_eq!(ollama["role"], "tool");

        let openai = ToolFormatter::OpenAi.format_tool_result("read_file", "contents");
        assert_eq!(openai["role"], "tool");
        assert!(openai.get("tool_call_id").is_some());

        let claude = ToolFormatter::Claude.format_tool_result("read_file", "contents");
        assert_eq!(claude["type"], "tool_result");

        let generic = ToolFormatter::Generic.format_tool_result("read_file", "contents");
        assert_eq!(generic["role"], "user");
        assert!(generic["content"].as_str().unwrap().contains("<tool_result name=\"read_file\">"));
    }

    #[test]
    fn test_for_backend() {
        assert_eq!(ToolFormatter::for_backend("ollama"), ToolFormatter::Ollama);
        assert_eq!(ToolFormatter::for_backend("Claude"), ToolFormatter::Claude);
        assert_eq!(ToolFormatter::for_backend("openai"), ToolFormatter::OpenAi);
        assert_eq!(ToolFormatter::for_backend("mystery"), ToolFormatter::Generic);
    }

    #[test]
    fn test_extract_text_union() {
        assert_eq!(extract_text(&json!({"message": {"content": "from ollama"}})), "from ollama");
        assert_eq!(extract_text(&json!({"response": "from generate"})), "from generate");
        assert_eq!(
            extract_text(&json!({"choices": [{"message": {"content": "from openai"}}]})),
            "from openai"
        );
        assert_eq!(
            extract_text(&json!({"content": [
                {"type": "text", "text": "from"},
                {"type": "tool_use", "name": "x", "input": {}},
                {"type": "text", "text": "claude"}
            ]})),
            "from\nclaude"
        );
        assert_eq!(extract_text(&json!({})), "");
    }
}
