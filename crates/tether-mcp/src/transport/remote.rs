//! Remote event-stream transport (HTTP SSE + POST).
//!
//! The provider keeps a `text/event-stream` response open. Its first
//! `endpoint` event names the URL that requests are POSTed to; responses
//! come back as `message` events on the stream.

use super::{BoxFuture, PendingRequests, Transport, TransportKind};
use crate::error::McpError;
use crate::jsonrpc::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::sse::SseParser;
use futures_util::{Stream, StreamExt};
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::task::AbortOnDropHandle;

/// Transport to a provider reachable over a server-push event stream.
///
/// The reader task is aborted when the transport is dropped, so an
/// abandoned connect or handshake never leaves the stream open.
pub struct SseTransport {
    provider: String,
    http: reqwest::Client,
    endpoint: Url,
    timeout_ms: u64,
    pending: Arc<PendingRequests>,
    reader: Option<AbortOnDropHandle<()>>,
}

impl SseTransport {
    /// Open the event stream and wait for the provider to announce its
    /// POST endpoint.
    pub async fn connect(provider: &str, url: &str, timeout_ms: u64) -> Result<Self, McpError> {
        let connection_err = |message: String| McpError::Connection {
            provider: provider.to_string(),
            message,
        };
        let handshake_err = |message: String| McpError::Handshake {
            provider: provider.to_string(),
            message,
        };

        let base = Url::parse(url).map_err(|e| connection_err(format!("invalid url '{url}': {e}")))?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| connection_err(e.to_string()))?;

        let response = http
            .get(base.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| connection_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(connection_err(format!("event stream returned HTTP {status}")));
        }

        let pending = Arc::new(PendingRequests::new());
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = AbortOnDropHandle::new(tokio::spawn(read_events(
            provider.to_string(),
            response.bytes_stream(),
            Arc::clone(&pending),
            endpoint_tx,
        )));

        let announced =
            tokio::time::timeout(Duration::from_millis(timeout_ms), endpoint_rx).await;
        let path = match announced {
            Ok(Ok(path)) => path,
            Ok(Err(_)) => {
                return Err(handshake_err(
                    "event stream ended before an endpoint was announced".to_string(),
                ));
            }
            Err(_) => {
                return Err(handshake_err(format!(
                    "no endpoint event within {timeout_ms}ms"
                )));
            }
        };
        let endpoint = base
            .join(path.trim())
            .map_err(|e| handshake_err(format!("bad endpoint '{path}': {e}")))?;

        tracing::debug!("Provider '{provider}' accepts requests at {endpoint}");

        Ok(Self {
            provider: provider.to_string(),
            http,
            endpoint,
            timeout_ms,
            pending,
            reader: Some(reader),
        })
    }

    fn ensure_open(&self) -> Result<(), McpError> {
        if self.reader.is_none() {
            return Err(McpError::SessionClosed {
                provider: self.provider.clone(),
            });
        }
        Ok(())
    }

    /// POST one frame; returns the response body.
    async fn post(&self, body: String) -> Result<String, McpError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(Duration::from_millis(self.timeout_ms))
            .body(body)
            .send()
            .await
            .map_err(|e| McpError::Connection {
                provider: self.provider.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(McpError::Connection {
                provider: self.provider.clone(),
                message: format!("message rejected with HTTP {status}: {text}"),
            });
        }
        Ok(text)
    }
}

impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::RemoteStream
    }

    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let (id, rx) = self.pending.register().await;
            let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

            match self.post(body).await {
                // Some servers answer inline instead of on the stream
                Ok(text) if !text.trim().is_empty() => {
                    if let Ok(Some(resp)) = jsonrpc::parse_inbound(&text) {
                        self.pending.complete(resp).await;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    self.pending.forget(id).await;
                    return Err(e);
                }
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
            self.ensure_open()?;
            let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
            self.post(body).await.map(|_| ())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            if let Some(reader) = self.reader.take() {
                // Aborting the reader drops the HTTP response and its socket
                reader.abort();
                self.pending.clear().await;
                tracing::debug!("Closed event stream for '{}'", self.provider);
            }
            Ok(())
        })
    }

    fn abort(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Drive the event stream until it ends or the task is aborted.
async fn read_events<S, B, E>(
    provider: String,
    stream: S,
    pending: Arc<PendingRequests>,
    endpoint_tx: oneshot::Sender<String>,
) where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let mut stream = Box::pin(stream);
    let mut endpoint_tx = Some(endpoint_tx);
    let mut parser = SseParser::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Event stream from '{provider}' failed: {e}");
                break;
            }
        };
        for event in parser.feed(chunk.as_ref()) {
            match event.event.as_str() {
                "endpoint" => match endpoint_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(event.data);
                    }
                    None => tracing::debug!("'{provider}' re-announced its endpoint; ignoring"),
                },
                "message" => match jsonrpc::parse_inbound(&event.data) {
                    Ok(Some(resp)) => pending.complete(resp).await,
                    Ok(None) => tracing::debug!("Ignoring server-initiated message from '{provider}'"),
                    Err(e) => tracing::warn!("Unparseable event from '{provider}': {e}"),
                },
                other => tracing::debug!("Ignoring '{other}' event from '{provider}'"),
            }
        }
    }

    pending.clear().await;
}
