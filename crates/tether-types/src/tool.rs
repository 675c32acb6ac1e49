//! Tool descriptors and the local built-in tool trait.

use serde::{Deserialize, Serialize};

use crate::ToolError;

/// A tool in the canonical schema understood by the model boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema object describing the arguments.
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The function-tool form sent to chat-completion style models.
    pub fn function_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Schema for a tool that takes no arguments.
pub fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// A tool executed in-process, synchronously.
///
/// Local tools are checked after host actions and before provider tools.
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;

    /// The descriptor offered to the model.
    fn definition(&self) -> ToolDescriptor;

    /// Run the tool with already-parsed arguments.
    fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError>;
}
