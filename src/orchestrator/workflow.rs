//! Workflow documents - batches of named tasks with dependency edges

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A workflow document
///
/// Task `depends_on` entries reference other tasks by workflow name;
/// submission maps them to queue task ids. Cycles are not detected;
/// the caller must supply a DAG.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDoc {
    #[serde(default = "default_workflow_name")]
    pub name: String,

    /// Instances to scale to before submitting
    #[serde(default = "default_instances")]
    pub instances: usize,

    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
}

fn default_workflow_name() -> String {
    "unnamed".to_string()
}

fn default_instances() -> usize {
    1
}

/// One task in a workflow document
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowTask {
    pub name: String,

    /// Prompt text; `command` is the legacy spelling
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub directory: Option<String>,

    /// Pin to a specific instance id
    #[serde(default)]
    pub instance: Option<String>,

    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl WorkflowTask {
    /// The effective prompt: `command` wins over `prompt`
    pub fn effective_prompt(&self) -> &str {
        self.command.as_deref().or(self.prompt.as_deref()).unwrap_or_default()
    }
}

/// What a submitted workflow produced
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub workflow_name: String,
    pub task_ids: Vec<String>,
    /// Workflow task name to queue task id
    pub task_mapping: HashMap<String, String>,
}
