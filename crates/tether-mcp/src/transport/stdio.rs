//! Subprocess transport.
//!
//! Spawns the provider as a child process and exchanges newline-delimited
//! JSON-RPC messages over its stdin/stdout.

use super::{BoxFuture, PendingRequests, Transport, TransportKind};
use crate::error::McpError;
use crate::jsonrpc::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long a provider gets to exit after stdin closes before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Async transport over a child process's stdio.
pub struct StdioTransport {
    provider: String,
    timeout_ms: u64,
    pending: Arc<PendingRequests>,
    live: Option<Live>,
}

/// Resources that exist only while the process is connected.
struct Live {
    write_tx: mpsc::Sender<String>,
    child: Child,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl StdioTransport {
    /// Spawn `command` and start the background reader/writer tasks.
    pub fn spawn(
        provider: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let connection_err = |message: String| McpError::Connection {
            provider: provider.to_string(),
            message,
        };

        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| connection_err(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| connection_err("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connection_err("child stdout unavailable".to_string()))?;

        let pending = Arc::new(PendingRequests::new());

        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(frame) = write_rx.recv().await {
                let written = async {
                    stdin.write_all(frame.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                };
                if written.await.is_err() {
                    break;
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader_provider = provider.to_string();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match jsonrpc::parse_inbound(line) {
                    Ok(Some(resp)) => reader_pending.complete(resp).await,
                    Ok(None) => {
                        tracing::debug!("Ignoring server-initiated message from '{reader_provider}'")
                    }
                    Err(e) => {
                        tracing::warn!("Unparseable output from '{reader_provider}': {e}: {line}")
                    }
                }
            }
            // EOF: nobody will answer what is still outstanding
            reader_pending.clear().await;
        });

        tracing::debug!("Spawned provider '{provider}' ({command})");

        Ok(Self {
            provider: provider.to_string(),
            timeout_ms,
            pending,
            live: Some(Live {
                write_tx,
                child,
                reader,
                writer,
            }),
        })
    }

    fn writer(&self) -> Result<&mpsc::Sender<String>, McpError> {
        self.live
            .as_ref()
            .map(|live| &live.write_tx)
            .ok_or_else(|| McpError::SessionClosed {
                provider: self.provider.clone(),
            })
    }

    async fn send_frame(&self, frame: String) -> Result<(), McpError> {
        self.writer()?
            .send(frame)
            .await
            .map_err(|_| McpError::Protocol(format!("'{}' stdin is closed", self.provider)))
    }
}

impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>> {
        Box::pin(async move {
            self.writer()?;
            let (id, rx) = self.pending.register().await;
            let frame = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
            if let Err(e) = self.send_frame(frame).await {
                self.pending.forget(id).await;
                return Err(e);
            }
            self.pending.wait(id, rx, method, self.timeout_ms).await
        })
    }

    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<(), McpError>> {
        Box::pin(async move {
            let frame = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
            self.send_frame(frame).await
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            let Some(live) = self.live.take() else {
                return Ok(());
            };
            let Live {
                write_tx,
                mut child,
                reader,
                writer,
            } = live;

            // EOF on stdin asks the provider to exit on its own
            drop(write_tx);
            let exited = tokio::time::timeout(EXIT_GRACE, child.wait()).await;
            let result = match exited {
                Ok(Ok(status)) => {
                    tracing::debug!("Provider '{}' exited with {status}", self.provider);
                    Ok(())
                }
                Ok(Err(e)) => Err(McpError::Io(e)),
                Err(_) => {
                    tracing::debug!("Provider '{}' ignored EOF, killing", self.provider);
                    child.kill().await.map_err(McpError::Io)
                }
            };

            reader.abort();
            writer.abort();
            self.pending.clear().await;
            result
        })
    }

    fn abort(&mut self) {
        if let Some(mut live) = self.live.take() {
            let _ = live.child.start_kill();
            live.reader.abort();
            live.writer.abort();
        }
    }
}
