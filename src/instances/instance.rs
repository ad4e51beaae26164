//! AgentInstance - a long-lived executor bound to one (backend, model)

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::{AgentLoop, OllamaChatTransport};
use crate::config::BackendKind;
use crate::events::{EventBus, SwarmEvent};
use crate::models::TOOL_CAPABLE_FAMILIES;
use crate::queue::{ToolCallRecord, UsageStats};
use crate::tools::{ToolContext, ToolRegistry};
use crate::wire::ToolFormatter;

/// Hard timeout for the readiness probe at spawn
const READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Files appended to a prompt by path detection
const MAX_ENRICHED_FILES: usize = 3;
const MAX_ENRICHED_LINES: usize = 500;

static PROMPT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)((?:[\w./\\-]+/)?[\w.-]+\.(?:py|js|ts|rs|yaml|yml|json|toml|cfg|md|txt|html|css|sql|sh|bat))\b")
        .expect("valid prompt path pattern")
});

/// Status of an agent instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Starting,
    Idle,
    Busy,
    Error,
    Stopped,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Error => write!(f, "error"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A command handed to an instance for execution
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub prompt: String,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub metadata: Map<String, Value>,
}

/// Terminal status of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Completed,
    Error,
}

/// What came back from one execution on an instance
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub instance_id: String,
    pub status: ExecStatus,
    pub output: String,
    pub error: Option<String>,
    pub backend_name: String,
    pub model: String,
    pub usage: UsageStats,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iterations: u32,
}

struct InstanceState {
    status: InstanceStatus,
    current_task: Option<String>,
    completed_tasks: u64,
    error_count: u64,
    last_activity: DateTime<Utc>,
}

/// Serializable instance snapshot
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    pub id: String,
    pub status: InstanceStatus,
    pub backend_name: String,
    pub model: String,
    pub url: String,
    pub working_dir: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub current_task: Option<String>,
    pub completed_tasks: u64,
    pub error_count: u64,
}

/// Long-lived executor pinned to a (backend, model) pair
///
/// Owns a reusable HTTP client; the `InstanceManager` owns the instance
/// itself. Executions run the tool-calling agent loop against the
/// bound backend.
pub struct AgentInstance {
    pub id: String,
    pub backend_name: String,
    pub model: String,
    url: String,
    kind: BackendKind,
    working_dir: PathBuf,
    client: reqwest::Client,
    events: Option<Arc<EventBus>>,
    created_at: DateTime<Utc>,
    stream_buffer: Arc<Mutex<String>>,
    state: Mutex<InstanceState>,
}

impl AgentInstance {
    pub fn new(
        backend_name: impl Into<String>,
        kind: BackendKind,
        url: impl Into<String>,
        model: impl Into<String>,
        working_dir: PathBuf,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            backend_name: backend_name.into(),
            model: model.into(),
            url: url.into(),
            kind,
            working_dir,
            client: reqwest::Client::new(),
            events,
            created_at: Utc::now(),
            stream_buffer: Arc::new(Mutex::new(String::new())),
            state: Mutex::new(InstanceState {
                status: InstanceStatus::Starting,
                current_task: None,
                completed_tasks: 0,
                error_count: 0,
                last_activity: Utc::now(),
            }),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        self.state.lock().expect("instance state lock").status
    }

    fn set_status(&self, status: InstanceStatus) {
        self.state.lock().expect("instance state lock").status = status;
    }

    /// Verify the bound backend is reachable and serves the model;
    /// transitions to idle on success, error otherwise
    pub async fn start(&self) -> bool {
        self.set_status(InstanceStatus::Starting);

        match self.kind {
            BackendKind::Ollama => {}
            // Hosted backends have no catalog to probe; trust config
            BackendKind::Claude | BackendKind::OpenAi => {
                self.set_status(InstanceStatus::Idle);
                return true;
            }
        }

        let response = self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(READINESS_TIMEOUT)
            .send()
            .await;

        let body: Value = match response {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(b) => b,
                Err(e) => {
                    error!(instance_id = %self.id, error = %e, "readiness probe returned bad JSON");
                    self.set_status(InstanceStatus::Error);
                    return false;
                }
            },
            Ok(r) => {
                error!(instance_id = %self.id, status = r.status().as_u16(), "backend not accessible");
                self.set_status(InstanceStatus::Error);
                return false;
            }
            Err(e) => {
                error!(instance_id = %self.id, error = %e, "backend connection failed");
                self.set_status(InstanceStatus::Error);
                return false;
            }
        };

        let names: Vec<&str> = body["models"]
            .as_array()
            .map(|models| models.iter().filter_map(|m| m["name"].as_str()).collect())
            .unwrap_or_default();

        let base = self.model.split(':').next().unwrap_or(&self.model);
        let latest = format!("{}:latest", self.model);
        let found = names
            .iter()
            .any(|name| *name == self.model || *name == latest || name.starts_with(base));

        if !found {
            error!(instance_id = %self.id, model = %self.model, available = ?names, "model not found on backend");
            self.set_status(InstanceStatus::Error);
            return false;
        }

        info!(instance_id = %self.id, backend = %self.backend_name, model = %self.model, "instance started");
        self.set_status(InstanceStatus::Idle);
        true
    }

    /// Execute a command through the agent loop
    pub async fn execute(&self, command: AgentCommand) -> ExecutionReport {
        {
            let mut state = self.state.lock().expect("instance state lock");
            state.status = InstanceStatus::Busy;
            state.current_task = Some(command.prompt.chars().take(100).collect());
            state.last_activity = Utc::now();
        }
        self.stream_buffer.lock().expect("stream buffer lock").clear();

        let cwd = command.working_dir.clone().unwrap_or_else(|| self.working_dir.clone());
        let task_id = command
            .metadata
            .get("task_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        info!(instance_id = %self.id, model = %self.model, backend = %self.backend_name,
              task_id = %task_id, "executing agent loop");

        let registry = Arc::new(ToolRegistry::builtin());
        let native_tools = model_supports_tools(&self.model);
        let formatter = if native_tools { ToolFormatter::Ollama } else { ToolFormatter::Generic };

        let transport = Arc::new(OllamaChatTransport::new(
            self.client.clone(),
            self.url.clone(),
            self.model.clone(),
            Duration::from_secs(command.timeout_secs),
            native_tools,
            self.stream_buffer.clone(),
            self.events.clone(),
            task_id.clone(),
            self.id.clone(),
        ));

        let tool_log: Arc<Mutex<Vec<ToolCallRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let hook_log = tool_log.clone();
        let hook_events = self.events.clone();
        let hook_task_id = task_id.clone();
        let hook_instance_id = self.id.clone();

        let prompt = enrich_prompt_with_files(&command.prompt, &cwd).await;
        let system_prompt = build_system_prompt(&cwd);

        let agent = AgentLoop::new(registry, formatter, transport.clone(), system_prompt).with_tool_call_hook(
            Box::new(move |event| {
                let record = ToolCallRecord {
                    tool: event.tool_name.clone(),
                    arguments: Value::Object(event.arguments.clone()),
                    success: event.result.success,
                    duration_ms: (event.duration_ms * 10.0).round() / 10.0,
                };
                hook_log.lock().expect("tool log lock").push(record);

                if let Some(events) = &hook_events {
                    events.emit(SwarmEvent::ToolCall {
                        task_id: hook_task_id.clone(),
                        instance_id: hook_instance_id.clone(),
                        tool: event.tool_name.clone(),
                        args_summary: summarize_args(&event.arguments),
                        success: event.result.success,
                        duration_ms: event.duration_ms as u64,
                    });
                }
            }),
        );

        let ctx = ToolContext::new(cwd);
        let outcome = agent.run(&prompt, &ctx).await;

        let tool_calls = std::mem::take(&mut *tool_log.lock().expect("tool log lock"));
        let mut state = self.state.lock().expect("instance state lock");
        state.current_task = None;
        state.last_activity = Utc::now();
        self.stream_buffer.lock().expect("stream buffer lock").clear();

        match outcome {
            Ok(result) => {
                state.status = InstanceStatus::Idle;
                state.completed_tasks += 1;
                info!(instance_id = %self.id, iterations = result.iterations,
                      tool_calls = tool_calls.len(), "agent loop completed");
                ExecutionReport {
                    instance_id: self.id.clone(),
                    status: ExecStatus::Completed,
                    output: result.response,
                    error: None,
                    backend_name: self.backend_name.clone(),
                    model: self.model.clone(),
                    usage: transport.usage(),
                    tool_calls,
                    iterations: result.iterations,
                }
            }
            Err(e) => {
                state.status = InstanceStatus::Idle;
                state.error_count += 1;
                warn!(instance_id = %self.id, error = %e, "agent loop failed");
                ExecutionReport {
                    instance_id: self.id.clone(),
                    status: ExecStatus::Error,
                    output: String::new(),
                    error: Some(e.to_string()),
                    backend_name: self.backend_name.clone(),
                    model: self.model.clone(),
                    usage: transport.usage(),
                    tool_calls,
                    iterations: 0,
                }
            }
        }
    }

    /// Stop the instance; its HTTP pool closes when dropped
    pub fn stop(&self) {
        info!(instance_id = %self.id, "instance stopped");
        self.set_status(InstanceStatus::Stopped);
    }

    /// Snapshot for external observers
    pub fn info(&self) -> InstanceInfo {
        let state = self.state.lock().expect("instance state lock");
        InstanceInfo {
            id: self.id.clone(),
            status: state.status,
            backend_name: self.backend_name.clone(),
            model: self.model.clone(),
            url: self.url.clone(),
            working_dir: self.working_dir.display().to_string(),
            created_at: self.created_at,
            last_activity: state.last_activity,
            current_task: state.current_task.clone(),
            completed_tasks: state.completed_tasks,
            error_count: state.error_count,
        }
    }

    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock().expect("instance state lock");
        (state.completed_tasks, state.error_count)
    }
}

/// Check if a model family is known to handle native tool calling
pub fn model_supports_tools(model: &str) -> bool {
    let model_lower = model.to_lowercase();
    TOOL_CAPABLE_FAMILIES.iter().any(|family| model_lower.contains(family))
}

/// System prompt for autonomous code work
fn build_system_prompt(cwd: &std::path::Path) -> String {
    format!(
        "You are an expert software engineer with access to tools for reading files, \
         searching code, listing directories, and running commands.\n\n\
         IMPORTANT RULES:\n\
         1. ALWAYS use your tools to investigate before answering. Never guess at file \
         contents or code structure. Use read_file, list_directory, and search_files.\n\
         2. Start by using list_directory to understand the project structure.\n\
         3. Use read_file to examine specific files. Use search_files to find patterns.\n\
         4. Be specific: cite file paths, line numbers, and quote code directly.\n\
         5. Be thorough but concise in your final answer.\n\n\
         Working directory: {}\n\
         You MUST use tools to explore the codebase. Do NOT ask the user to provide \
         code. Read it yourself with the tools available to you.",
        cwd.display()
    )
}

/// Append the contents of files mentioned in the prompt
///
/// Detects up to three file-path-looking tokens and inlines each file
/// (capped at 500 lines) so small models get context without a tool
/// round-trip.
async fn enrich_prompt_with_files(prompt: &str, cwd: &std::path::Path) -> String {
    let mut extras = Vec::new();
    let mut seen = Vec::new();

    for captures in PROMPT_PATH_RE.captures_iter(prompt) {
        if extras.len() >= MAX_ENRICHED_FILES {
            break;
        }
        let rel_path = captures[1].trim().to_string();
        if seen.contains(&rel_path) {
            continue;
        }
        seen.push(rel_path.clone());

        let mut full_path = cwd.join(&rel_path);
        if !full_path.exists() {
            let candidate = cwd.join("src").join(&rel_path);
            if candidate.exists() {
                full_path = candidate;
            }
        }
        if !full_path.is_file() {
            continue;
        }

        let Ok(text) = tokio::fs::read_to_string(&full_path).await else {
            continue;
        };
        let lines: Vec<&str> = text.lines().collect();
        let (body, shown) = if lines.len() > MAX_ENRICHED_LINES {
            (
                format!(
                    "{}\n\n... (truncated at {} lines)",
                    lines[..MAX_ENRICHED_LINES].join("\n"),
                    MAX_ENRICHED_LINES
                ),
                MAX_ENRICHED_LINES,
            )
        } else {
            (lines.join("\n"), lines.len())
        };

        extras.push(format!("\n\n--- FILE: {} ({} lines) ---\n```\n{}\n```", rel_path, shown, body));
    }

    if extras.is_empty() {
        return prompt.to_string();
    }
    format!("{}\n\nHere are the file contents for your review:{}", prompt, extras.join(""))
}

/// Compact one-line summary of tool arguments for event streams
fn summarize_args(arguments: &Map<String, Value>) -> String {
    let rendered = serde_json::to_string(&json!(arguments)).unwrap_or_default();
    rendered.chars().take(120).collect()
}
