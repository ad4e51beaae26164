//! Task types and status lifecycle

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Status of a task
///
/// Transitions follow `pending -> queued -> running -> {completed |
/// failed | cancelled}`; the three final states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Priority level for tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Token usage counters reported by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_duration_ms: f64,
}

/// One executed tool call, as recorded in a task result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    pub success: bool,
    pub duration_ms: f64,
}

/// Result of a successfully executed task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: String,
    pub backend_name: String,
    pub model: String,
    pub usage: UsageStats,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iterations: u32,
}

/// Terminal outcome handed to completion callbacks
#[derive(Debug)]
pub enum TaskOutcome<'a> {
    Completed(&'a TaskResult),
    Failed(&'a str),
}

/// Completion callback; errors are logged and swallowed by the queue
pub type TaskCallback = Arc<dyn Fn(&TaskOutcome<'_>) -> eyre::Result<()> + Send + Sync>;

/// A unit of work flowing through the orchestrator
#[derive(Clone)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub working_dir: Option<PathBuf>,
    pub priority: TaskPriority,
    pub timeout_secs: u64,
    pub status: TaskStatus,
    pub instance_id: Option<String>,
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
    pub callback: Option<TaskCallback>,
}

impl Task {
    /// Create a task with defaults; the name falls back to a prompt prefix
    pub fn new(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let name: String = prompt.chars().take(50).collect();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            prompt,
            working_dir: None,
            priority: TaskPriority::Normal,
            timeout_secs: 300,
            status: TaskStatus::Pending,
            instance_id: None,
            depends_on: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            metadata: Map::new(),
            callback: None,
        }
    }

    /// Snapshot for external observers
    pub fn info(&self, include_result: bool) -> TaskInfo {
        TaskInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            prompt: self.prompt.chars().take(100).collect(),
            status: self.status,
            priority: self.priority,
            instance_id: self.instance_id.clone(),
            depends_on: self.depends_on.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_seconds: match (self.started_at, self.completed_at) {
                (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
                _ => None,
            },
            error: self.error.clone(),
            metadata: self.metadata.clone(),
            result: if include_result { self.result.clone() } else { None },
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("priority", &self.priority)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// Serializable task record for status queries and listings
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub instance_id: Option<String>,
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}
