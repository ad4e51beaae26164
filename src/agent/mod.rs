//! ReAct agent loop and chat transports

mod engine;
mod transport;

pub use engine::{
    AgentLoop, AgentLoopResult, DEFAULT_MAX_ITERATIONS, StoppedReason, ToolCallEvent, ToolCallHook,
};
pub use transport::{ChatTransport, OllamaChatTransport};
