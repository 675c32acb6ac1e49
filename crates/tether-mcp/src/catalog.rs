//! Normalization of provider-native tool descriptions.
//!
//! Providers describe tools in slightly different shapes (`inputSchema`,
//! `input_schema`, `parameters`; optional description). [`normalize`] maps
//! all of them onto [`ToolDescriptor`].

use crate::error::McpError;
use serde_json::Value;
use tether_types::{ToolDescriptor, empty_object_schema};

/// Keys a provider may use for the argument schema, in lookup order.
const SCHEMA_KEYS: [&str; 3] = ["inputSchema", "input_schema", "parameters"];

/// Convert one provider-native tool description into the canonical form.
///
/// Fails only when there is no usable name. A missing description becomes
/// `"Tool: <name>"`; a missing or non-object schema becomes an empty object
/// schema. The input is never modified.
pub fn normalize(native: &Value) -> Result<ToolDescriptor, McpError> {
    let entry = native
        .as_object()
        .ok_or_else(|| McpError::MalformedTool(format!("expected an object, got {native}")))?;

    let name = match entry.get("name").and_then(Value::as_str).map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(McpError::MalformedTool("tool has no name".to_string())),
    };

    let description = match entry.get("description").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => format!("Tool: {name}"),
    };

    let parameters = SCHEMA_KEYS
        .iter()
        .find_map(|key| entry.get(*key).filter(|v| !v.is_null()))
        .and_then(Value::as_object)
        .map(|schema| {
            let mut schema = schema.clone();
            schema
                .entry("type")
                .or_insert_with(|| Value::String("object".to_string()));
            Value::Object(schema)
        })
        .unwrap_or_else(empty_object_schema);

    Ok(ToolDescriptor {
        name,
        description,
        parameters,
    })
}
