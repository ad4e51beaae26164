//! Agent instance pool

mod instance;
mod manager;

pub use instance::{
    AgentCommand, AgentInstance, ExecStatus, ExecutionReport, InstanceInfo, InstanceStatus, model_supports_tools,
};
pub use manager::{InstanceManager, InstanceStats};
