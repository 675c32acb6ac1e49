//! Provider connections for Tether.
//!
//! Providers are MCP-style tool servers reached either as a spawned
//! subprocess (newline-delimited JSON-RPC over stdio) or as a remote
//! server-push event stream (HTTP SSE + POST). Each configured provider gets
//! a [`Session`]; the [`SessionManager`] merges their tools into one catalog
//! and owns every session until teardown.

pub mod catalog;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod session;
mod sse;
pub mod transport;

pub use catalog::normalize;
pub use config::{Connection, ProviderConfig, ProviderDescriptor};
pub use error::McpError;
pub use manager::{ProviderFailure, SessionId, SessionManager};
pub use session::{McpToolContent, McpToolResult, ServerInfo, Session, SessionState};
pub use transport::{
    BoxFuture, Connector, DefaultConnector, SseTransport, StdioTransport, Transport, TransportKind,
};
