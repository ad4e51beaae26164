//! Event types for orchestrator activity streaming
//!
//! Small, serializable events consumed by dashboards and log sinks:
//! partial assistant text, executed tool calls, task completions, and
//! periodic status snapshots. Delivery is best-effort.

use serde::{Deserialize, Serialize};

/// The vocabulary of observable orchestrator activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SwarmEvent {
    /// Partial assistant text produced during an agent iteration
    Token {
        task_id: String,
        instance_id: String,
        text: String,
    },

    /// A tool call executed by the agent loop
    ToolCall {
        task_id: String,
        instance_id: String,
        tool: String,
        args_summary: String,
        success: bool,
        duration_ms: u64,
    },

    /// A task reached a terminal status
    TaskDone { task_id: String, status: String },

    /// Periodic orchestrator status snapshot
    Status { snapshot: serde_json::Value },
}

impl SwarmEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            SwarmEvent::Token { .. } => "Token",
            SwarmEvent::ToolCall { .. } => "ToolCall",
            SwarmEvent::TaskDone { .. } => "TaskDone",
            SwarmEvent::Status { .. } => "Status",
        }
    }

    /// Get the task ID this event relates to, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SwarmEvent::Token { task_id, .. }
            | SwarmEvent::ToolCall { task_id, .. }
            | SwarmEvent::TaskDone { task_id, .. } => Some(task_id),
            SwarmEvent::Status { .. } => None,
        }
    }
}
