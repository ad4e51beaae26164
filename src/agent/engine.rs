//! AgentLoop - ReAct driver over any chat backend
//!
//! Repeatedly sends the conversation plus tool schemas to the backend,
//! executes whatever tool calls come back, appends the results, and
//! stops when the model answers without tools or the iteration cap is
//! reached.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::SwarmError;
use crate::tools::{ToolContext, ToolRegistry, ToolResult};
use crate::wire::{FormattedTools, ToolFormatter, extract_text};

use super::transport::ChatTransport;

/// Default cap on think/act/observe iterations
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Messages at the tail of the conversation always kept verbatim
const KEEP_RECENT: usize = 6;

/// Middle-of-conversation messages are trimmed to this many characters
const MAX_RESULT_CHARS: usize = 800;

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppedReason {
    /// The model answered without requesting tools
    Complete,
    /// The iteration cap was hit
    MaxIterations,
}

impl StoppedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::MaxIterations => "max_iterations",
        }
    }
}

/// Record of a single tool call during the loop
#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    pub iteration: u32,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub result: ToolResult,
    pub duration_ms: f64,
}

/// Final result of an agent loop run
#[derive(Debug, Clone)]
pub struct AgentLoopResult {
    pub response: String,
    pub tool_calls: Vec<ToolCallEvent>,
    pub iterations: u32,
    pub total_duration_ms: f64,
    pub stopped_reason: StoppedReason,
}

/// Hook fired after each executed tool call
pub type ToolCallHook = Box<dyn Fn(&ToolCallEvent) + Send + Sync>;

/// ReAct-style agent loop over an injected chat transport
pub struct AgentLoop {
    registry: Arc<ToolRegistry>,
    formatter: ToolFormatter,
    transport: Arc<dyn ChatTransport>,
    max_iterations: u32,
    system_prompt: String,
    on_tool_call: Option<ToolCallHook>,
}

impl AgentLoop {
    pub fn new(
        registry: Arc<ToolRegistry>,
        formatter: ToolFormatter,
        transport: Arc<dyn ChatTransport>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            formatter,
            transport,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: system_prompt.into(),
            on_tool_call: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tool_call_hook(mut self, hook: ToolCallHook) -> Self {
        self.on_tool_call = Some(hook);
        self
    }

    /// Run the loop for one user message
    pub async fn run(&self, user_message: &str, ctx: &ToolContext) -> Result<AgentLoopResult, SwarmError> {
        let start = Instant::now();
        let mut tool_call_events: Vec<ToolCallEvent> = Vec::new();

        let definitions = self.registry.definitions();
        let mut tools_value: Option<Value> = None;
        let mut system_content = self.system_prompt.clone();

        match self.formatter.format_tools(&definitions) {
            FormattedTools::Schemas(schemas) => tools_value = Some(schemas),
            // Generic dialect: the manual rides in the system prompt and
            // no tools value goes over the wire
            FormattedTools::Manual(manual) => {
                if system_content.is_empty() {
                    system_content = manual;
                } else {
                    system_content = format!("{}\n\n{}", system_content, manual);
                }
            }
        }

        let mut messages: Vec<Value> = Vec::new();
        if !system_content.is_empty() {
            messages.push(json!({"role": "system", "content": system_content}));
        }
        messages.push(json!({"role": "user", "content": user_message}));

        let mut final_text = String::new();
        let mut iteration = 0u32;
        let mut completed = false;

        while iteration < self.max_iterations {
            iteration += 1;

            let pruned = prune_context(&messages);
            let response = self.transport.send(&pruned, tools_value.as_ref()).await?;

            final_text = extract_text(&response);
            let tool_calls = self.formatter.parse_tool_calls(&response);

            if tool_calls.is_empty() {
                completed = true;
                break;
            }

            messages.push(build_assistant_message(&response, &final_text));

            for call in tool_calls {
                let t0 = Instant::now();
                let result = self
                    .registry
                    .execute(&call.name, Value::Object(call.arguments.clone()), ctx)
                    .await;
                let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

                debug!(tool = %call.name, success = result.success, duration_ms, "tool executed");

                let event = ToolCallEvent {
                    iteration,
                    tool_name: call.name.clone(),
                    arguments: call.arguments,
                    result: result.clone(),
                    duration_ms,
                };
                if let Some(hook) = &self.on_tool_call {
                    hook(&event);
                }
                tool_call_events.push(event);

                messages.push(self.formatter.format_tool_result(&call.name, &result.to_message()));
            }
        }

        let stopped_reason = if completed {
            StoppedReason::Complete
        } else {
            warn!(max_iterations = self.max_iterations, "agent loop hit iteration cap");
            if final_text.is_empty() {
                final_text = "(Agent reached maximum iterations)".to_string();
            }
            StoppedReason::MaxIterations
        };

        Ok(AgentLoopResult {
            response: final_text,
            tool_calls: tool_call_events,
            iterations: iteration,
            total_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            stopped_reason,
        })
    }
}

/// Build the assistant message appended to the conversation history
///
/// Native tool-call fields are passed through so the backend sees its
/// own dialect; otherwise the plain text is kept.
fn build_assistant_message(response: &Value, text: &str) -> Value {
    if let Some(message) = response["message"].as_object()
        && message.contains_key("tool_calls")
    {
        let mut assistant = message.clone();
        assistant.insert("role".to_string(), json!("assistant"));
        return Value::Object(assistant);
    }
    json!({"role": "assistant", "content": text})
}

/// Truncate old intermediate messages to keep context size manageable
///
/// The system message (index 0) and the last `KEEP_RECENT` messages are
/// preserved verbatim; string contents in between are capped at
/// `MAX_RESULT_CHARS`.
fn prune_context(messages: &[Value]) -> Vec<Value> {
    if messages.len() <= KEEP_RECENT + 2 {
        return messages.to_vec();
    }

    let protected_tail = messages.len() - KEEP_RECENT;
    messages
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            if i == 0 || i >= protected_tail {
                return msg.clone();
            }
            let Some(content) = msg["content"].as_str() else {
                return msg.clone();
            };
            if content.chars().count() <= MAX_RESULT_CHARS {
                return msg.clone();
            }
            let trimmed: String = content.chars().take(MAX_RESULT_CHARS).collect();
            let mut pruned = msg.clone();
            pruned["content"] = json!(format!("{} ... [truncated]", trimmed));
            pruned
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Scripted transport that replays canned responses and records
    /// every message list it was sent
    struct ScriptedTransport {
        responses: Vec<Value>,
        call_count: AtomicUsize,
        sent: Mutex<Vec<Vec<Value>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Value>) -> Self {
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        fn sent_messages(&self) -> Vec<Vec<Value>> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(&self, messages: &[Value], _tools: Option<&Value>) -> Result<Value, SwarmError> {
            self.sent.lock().unwrap().push(messages.to_vec());
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            // Replay the last response when the script runs out
            Ok(self
                .responses
                .get(idx)
                .or_else(|| self.responses.last())
                .cloned()
                .unwrap_or_else(|| json!({"message": {"content": "done"}})))
        }
    }

    fn plain_response(text: &str) -> Value {
        json!({"message": {"role": "assistant", "content": text}})
    }

    fn tool_call_response(tool: &str, args: Value) -> Value {
        json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": tool, "arguments": args}}]
            }
        })
    }

    #[tokio::test]
    async fn test_plain_answer_completes_in_one_iteration() {
        let transport = Arc::new(ScriptedTransport::new(vec![plain_response("All looks good.")]));
        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Ollama,
            transport.clone(),
            "You are a reviewer.",
        );

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = agent.run("Review this", &ctx).await.unwrap();

        assert_eq!(result.iterations, 1);
        assert_eq!(result.stopped_reason, StoppedReason::Complete);
        assert_eq!(result.response, "All looks good.");
        assert!(result.tool_calls.is_empty());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_tool_call_executed_and_result_appended() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("src_foo.py"), "print('hi')").unwrap();

        let transport = Arc::new(ScriptedTransport::new(vec![
            tool_call_response("read_file", json!({"path": "src_foo.py"})),
            plain_response("The file prints hi."),
        ]));
        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Ollama,
            transport.clone(),
            "You are an engineer.",
        );

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = agent.run("Analyze src_foo.py", &ctx).await.unwrap();

        assert_eq!(result.iterations, 2);
        assert_eq!(result.stopped_reason, StoppedReason::Complete);
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].tool_name, "read_file");
        assert!(result.tool_calls[0].result.success);

        // Second send sees system, user, assistant (with tool_calls), tool result
        let sent = transport.sent_messages();
        let second = &sent[1];
        assert_eq!(second.len(), 4);
        assert_eq!(second[2]["role"], "assistant");
        assert!(second[2].get("tool_calls").is_some());
        assert_eq!(second[3]["role"], "tool");
        assert!(second[3]["content"].as_str().unwrap().contains("print('hi')"));
    }

    #[tokio::test]
    async fn test_max_iterations_cap() {
        // Always asks for another tool call
        let transport = Arc::new(ScriptedTransport::new(vec![tool_call_response(
            "list_directory",
            json!({}),
        )]));
        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Ollama,
            transport.clone(),
            "",
        )
        .with_max_iterations(3);

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = agent.run("loop forever", &ctx).await.unwrap();

        assert_eq!(result.iterations, 3);
        assert_eq!(transport.calls(), 3);
        assert_eq!(result.stopped_reason, StoppedReason::MaxIterations);
        assert_eq!(result.tool_calls.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_failed_result() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            tool_call_response("imaginary_tool", json!({})),
            plain_response("Giving up on that tool."),
        ]));
        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Ollama,
            transport.clone(),
            "",
        );

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = agent.run("use a fake tool", &ctx).await.unwrap();

        assert_eq!(result.stopped_reason, StoppedReason::Complete);
        assert!(!result.tool_calls[0].result.success);

        // The model saw the failure as an error message
        let sent = transport.sent_messages();
        assert!(sent[1][3]["content"].as_str().unwrap().starts_with("Error: Unknown tool"));
    }

    #[tokio::test]
    async fn test_tool_call_hook_fires() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("f.txt"), "x").unwrap();

        let transport = Arc::new(ScriptedTransport::new(vec![
            tool_call_response("read_file", json!({"path": "f.txt"})),
            plain_response("done"),
        ]));
        let hook_count = Arc::new(AtomicUsize::new(0));
        let hook_count_clone = hook_count.clone();

        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Ollama,
            transport,
            "",
        )
        .with_tool_call_hook(Box::new(move |event| {
            assert_eq!(event.tool_name, "read_file");
            hook_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let ctx = ToolContext::new(temp.path().to_path_buf());
        agent.run("read f.txt", &ctx).await.unwrap();

        assert_eq!(hook_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generic_formatter_manual_in_system_prompt() {
        let transport = Arc::new(ScriptedTransport::new(vec![plain_response("no tools needed")]));
        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Generic,
            transport.clone(),
            "You are an engineer.",
        );

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        agent.run("hello", &ctx).await.unwrap();

        let sent = transport.sent_messages();
        let system = sent[0][0]["content"].as_str().unwrap();
        assert!(system.starts_with("You are an engineer."));
        assert!(system.contains("<tool_call>"));
        assert!(system.contains("read_file"));
    }

    #[tokio::test]
    async fn test_generic_dialect_round_trip() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("g.txt"), "generic contents").unwrap();

        let transport = Arc::new(ScriptedTransport::new(vec![
            json!({"message": {"content": "<tool_call>{\"name\": \"read_file\", \"arguments\": {\"path\": \"g.txt\"}}</tool_call>"}}),
            plain_response("saw it"),
        ]));
        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Generic,
            transport.clone(),
            "",
        );

        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = agent.run("read g.txt", &ctx).await.unwrap();

        assert_eq!(result.tool_calls.len(), 1);

        // Tool result goes back as a user-role message in the generic dialect
        let sent = transport.sent_messages();
        let result_msg = &sent[1][3];
        assert_eq!(result_msg["role"], "user");
        assert!(result_msg["content"].as_str().unwrap().contains("<tool_result name=\"read_file\">"));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        struct FailingTransport;

        #[async_trait]
        impl ChatTransport for FailingTransport {
            async fn send(&self, _messages: &[Value], _tools: Option<&Value>) -> Result<Value, SwarmError> {
                Err(SwarmError::Timeout(30))
            }
        }

        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Ollama,
            Arc::new(FailingTransport),
            "",
        );

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let err = agent.run("hello", &ctx).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_prune_context_short_list_untouched() {
        let messages: Vec<Value> = (0..8).map(|i| json!({"role": "user", "content": format!("m{}", i)})).collect();
        let pruned = prune_context(&messages);
        assert_eq!(pruned, messages);
    }

    #[test]
    fn test_prune_context_truncates_middle_only() {
        let long = "x".repeat(1000);
        let mut messages = vec![json!({"role": "system", "content": long.clone()})];
        for _ in 0..4 {
            messages.push(json!({"role": "tool", "content": long.clone()}));
        }
        for i in 0..6 {
            messages.push(json!({"role": "user", "content": format!("recent {} {}", i, long)}));
        }

        let pruned = prune_context(&messages);

        // System message preserved verbatim
        assert_eq!(pruned[0]["content"].as_str().unwrap().len(), 1000);
        // Middle messages truncated
        for msg in &pruned[1..5] {
            let content = msg["content"].as_str().unwrap();
            assert!(content.ends_with(" ... [truncated]"));
            assert!(content.chars().count() < 1000);
        }
        // Last 6 preserved verbatim
        for msg in &pruned[5..] {
            assert!(!msg["content"].as_str().unwrap().contains("[truncated]"));
        }
    }

    #[test]
    fn test_prune_context_leaves_short_middle_messages() {
        let mut messages = vec![json!({"role": "system", "content": "sys"})];
        for i in 0..10 {
            messages.push(json!({"role": "tool", "content": format!("short {}", i)}));
        }

        let pruned = prune_context(&messages);
        assert_eq!(pruned, messages);
    }

    #[tokio::test]
    async fn test_max_iterations_sentinel_when_no_text() {
        let transport = Arc::new(ScriptedTransport::new(vec![tool_call_response(
            "list_directory",
            json!({}),
        )]));
        let agent = AgentLoop::new(
            Arc::new(ToolRegistry::builtin()),
            ToolFormatter::Ollama,
            transport,
            "",
        )
        .with_max_iterations(2);

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let result = agent.run("loop", &ctx).await.unwrap();

        assert_eq!(result.response, "(Agent reached maximum iterations)");
    }
}
