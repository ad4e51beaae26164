//! Tool system for agent loops
//!
//! Tools are named, schema-described functions the LLM can call through
//! the agent loop. Each task gets a `ToolContext` scoped to its working
//! directory; results come back as `ToolResult`, never as errors.

mod context;
mod registry;
mod traits;

pub mod builtin;

pub use context::ToolContext;
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolDefinition, ToolResult};
