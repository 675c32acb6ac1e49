//! Transports that carry JSON-RPC traffic to a provider.
//!
//! Two implementations exist: [`StdioTransport`] spawns a subprocess and
//! talks newline-delimited JSON over its stdin/stdout, [`SseTransport`]
//! listens on a server-push event stream and POSTs requests back. Both share
//! the same request/response correlation through [`PendingRequests`].

mod remote;
mod stdio;

pub use remote::SseTransport;
pub use stdio::StdioTransport;

use crate::config::Connection;
use crate::error::McpError;
use crate::jsonrpc::JsonRpcResponse;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

/// A boxed, sendable future, as returned by the dyn-compatible traits here.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which kind of channel a transport runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Local,
    RemoteStream,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Local => f.write_str("local"),
            TransportKind::RemoteStream => f.write_str("remote-stream"),
        }
    }
}

/// A bidirectional JSON-RPC channel to one provider.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send a request and wait for its correlated response.
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>>;

    /// Send a notification; no response is expected.
    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<(), McpError>>;

    /// Release every underlying resource. Calling it again is a no-op.
    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>>;

    /// Synchronous best-effort release for paths that cannot await.
    fn abort(&mut self);
}

/// Opens transports from resolved connections.
pub trait Connector: Send + Sync {
    fn open<'a>(
        &'a self,
        provider: &'a str,
        connection: &'a Connection,
        timeout_ms: u64,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>>;
}

/// Opens the real stdio and SSE transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn open<'a>(
        &'a self,
        provider: &'a str,
        connection: &'a Connection,
        timeout_ms: u64,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>> {
        Box::pin(async move {
            match connection {
                Connection::Local { command, args, env } => {
                    let transport = StdioTransport::spawn(provider, command, args, env, timeout_ms)?;
                    Ok(Box::new(transport) as Box<dyn Transport>)
                }
                Connection::RemoteStream { url } => {
                    let transport = SseTransport::connect(provider, url, timeout_ms).await?;
                    Ok(Box::new(transport) as Box<dyn Transport>)
                }
            }
        })
    }
}

/// Outstanding requests awaiting a response, keyed by JSON-RPC id.
pub(crate) struct PendingRequests {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an id and a receiver for its response.
    pub(crate) async fn register(&self) -> (u64, oneshot::Receiver<JsonRpcResponse>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().await.insert(id, tx);
        (id, rx)
    }

    /// Route a response to whoever is waiting for it.
    pub(crate) async fn complete(&self, response: JsonRpcResponse) {
        let Some(id) = response.id else {
            tracing::debug!("Dropping JSON-RPC response without id");
            return;
        };
        match self.waiting.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::debug!("No pending request for response id {id}"),
        }
    }

    pub(crate) async fn forget(&self, id: u64) {
        self.waiting.lock().await.remove(&id);
    }

    /// Fail every waiter, e.g. when the channel dies.
    pub(crate) async fn clear(&self) {
        self.waiting.lock().await.clear();
    }

    /// Wait for the response to `id`, giving up after `timeout_ms`.
    pub(crate) async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<JsonRpcResponse>,
        method: &str,
        timeout_ms: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(McpError::Protocol(format!(
                "Connection closed before '{method}' was answered"
            ))),
            Err(_) => {
                self.forget(id).await;
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}
