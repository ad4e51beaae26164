//! Task queue with priority and dependency semantics

mod core;
mod task;

pub use core::{QueueStats, TaskQueue};
pub use task::{
    Task, TaskCallback, TaskInfo, TaskOutcome, TaskPriority, TaskResult, TaskStatus, ToolCallRecord, UsageStats,
};
