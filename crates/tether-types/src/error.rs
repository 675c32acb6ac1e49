//! Error hierarchy for Tether.

use thiserror::Error;

/// Top-level error type for an orchestration run.
#[derive(Debug, Error)]
pub enum TetherError {
    #[error("Model invocation failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors from the model-invocation boundary.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model response: {0}")]
    Decode(String),

    #[error("Request timeout")]
    Timeout,
}

/// Errors from local built-in tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid input for tool '{tool}': {message}")]
    InvalidInput { tool: String, message: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
