//! Error types for provider communication.

use thiserror::Error;

/// Errors from provider connections, sessions, and tool dispatch.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to connect to provider '{provider}': {message}")]
    Connection { provider: String, message: String },

    #[error("Provider '{provider}' uses unsupported transport '{transport}'")]
    UnsupportedTransport { provider: String, transport: String },

    #[error("Handshake with provider '{provider}' failed: {message}")]
    Handshake { provider: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON-RPC error from '{provider}' (code {code}): {message}")]
    JsonRpc {
        provider: String,
        code: i64,
        message: String,
    },

    #[error("Malformed tool description: {0}")]
    MalformedTool(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Session for provider '{provider}' is closed")]
    SessionClosed { provider: String },

    #[error("Request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
