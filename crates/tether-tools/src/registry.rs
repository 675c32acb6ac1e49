//! Local tool registry for name-based dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use tether_types::{LocalTool, ToolDescriptor, ToolError};

/// Registry of local tools. Definitions come back in registration order.
pub struct LocalToolRegistry {
    tools: Vec<Arc<dyn LocalTool>>,
    index: HashMap<String, usize>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Create a registry with all built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::GetWeatherTool));
        registry
    }

    /// Register a tool. A second tool with the same name is ignored.
    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            tracing::warn!("Local tool '{name}' already registered; ignoring duplicate");
            return;
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
    }

    /// All tool definitions for sending to the model.
    pub fn definitions(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Execute a tool by name with the given input.
    pub fn execute(&self, name: &str, input: &serde_json::Value) -> Result<String, ToolError> {
        let idx = self
            .index
            .get(name)
            .ok_or_else(|| ToolError::ExecutionFailed(format!("Unknown tool: {name}")))?;
        self.tools[*idx].execute(input)
    }

    /// Check if a tool exists by name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for LocalToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
