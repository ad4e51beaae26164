//! ToolRegistry - named tool lookup and execution

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::builtin::{
    FileInfoTool, ListDirectoryTool, ReadFileTool, RunCommandTool, SearchFilesTool, WriteFileTool,
};
use super::{Tool, ToolContext, ToolDefinition, ToolResult};

/// Registry of tools available to the agent loop
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a registry with the built-in filesystem and shell tools
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(ListDirectoryTool));
        registry.register(Arc::new(SearchFilesTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(RunCommandTool));
        registry.register(Arc::new(FileInfoTool));
        registry
    }

    /// Create an empty registry (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Remove a tool
    pub fn unregister(&mut self, name: &str) {
        self.tools.remove(name);
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Schema records for every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name; unknown tools come back as a failed result
    pub async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(input, ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", name)),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
