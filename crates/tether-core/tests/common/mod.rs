//! Test doubles for the dispatch loop: a scripted model and an in-memory
//! calculator provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tether_core::RunEvent;
use tether_mcp::jsonrpc::JsonRpcResponse;
use tether_mcp::{
    BoxFuture, Connection, Connector, McpError, ProviderConfig, ProviderDescriptor, Transport,
    TransportKind,
};
use tether_types::model::{Model, ModelRequest};
use tether_types::{InvocationError, Message, ToolCall};

// ---------------------------------------------------------------------------
// MockModel
// ---------------------------------------------------------------------------

/// What the model saw on one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub system: String,
    pub message_count: usize,
    pub tool_names: Vec<String>,
}

enum Script {
    Replies(Mutex<VecDeque<Result<Message, InvocationError>>>),
    /// Always answer with a call to this tool.
    AlwaysCall(String),
}

/// A model that replays scripted replies, optionally after a delay.
pub struct MockModel {
    script: Script,
    delay_ms: Option<u64>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl MockModel {
    pub fn replies(replies: Vec<Result<Message, InvocationError>>) -> Self {
        Self {
            script: Script::Replies(Mutex::new(replies.into())),
            delay_ms: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always_calling(tool: &str) -> Self {
        Self {
            script: Script::AlwaysCall(tool.to_string()),
            delay_ms: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    fn next_reply(&self, call_index: usize) -> Result<Message, InvocationError> {
        match &self.script {
            Script::Replies(queue) => queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Message::assistant("(script exhausted)"))),
            Script::AlwaysCall(tool) => Ok(Message::assistant_with_calls(
                None,
                vec![ToolCall::new(format!("call_{call_index}"), tool, "{}")],
            )),
        }
    }
}

impl Model for MockModel {
    fn complete<'a>(
        &'a self,
        request: ModelRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Message, InvocationError>> + Send + 'a>> {
        let call_index = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(SeenRequest {
                system: request.system.to_string(),
                message_count: request.messages.len(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            });
            seen.len()
        };
        Box::pin(async move {
            if let Some(ms) = self.delay_ms {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            self.next_reply(call_index)
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub fn call(id: &str, name: &str, arguments: &str) -> Message {
    Message::assistant_with_calls(None, vec![ToolCall::new(id, name, arguments)])
}

// ---------------------------------------------------------------------------
// Calculator provider
// ---------------------------------------------------------------------------

/// Counters shared with a [`CalculatorTransport`].
#[derive(Clone, Default)]
pub struct Probe {
    pub closes: Arc<AtomicUsize>,
    pub aborts: Arc<AtomicUsize>,
    pub invocations: Arc<AtomicUsize>,
}

impl Probe {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

/// Connector serving one in-memory provider named `calculator` with `add`
/// and `divide`; any other provider name is refused.
#[derive(Default)]
pub struct CalculatorConnector {
    pub probe: Probe,
}

impl CalculatorConnector {
    pub fn config(extra_refused: &[&str]) -> ProviderConfig {
        let mut config = ProviderConfig::default();
        config.insert("calculator", ProviderDescriptor::local("calc", vec![]));
        for name in extra_refused {
            config.insert(*name, ProviderDescriptor::local("missing", vec![]));
        }
        config
    }
}

impl Connector for CalculatorConnector {
    fn open<'a>(
        &'a self,
        provider: &'a str,
        _connection: &'a Connection,
        _timeout_ms: u64,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>> {
        Box::pin(async move {
            if provider != "calculator" {
                return Err(McpError::Connection {
                    provider: provider.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(Box::new(CalculatorTransport {
                probe: self.probe.clone(),
                closed: false,
            }) as Box<dyn Transport>)
        })
    }
}

pub struct CalculatorTransport {
    probe: Probe,
    closed: bool,
}

fn reply(body: Value) -> JsonRpcResponse {
    serde_json::from_value(body).unwrap()
}

impl Transport for CalculatorTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>> {
        Box::pin(async move {
            let params = params.unwrap_or_default();
            let result = match method {
                "initialize" => json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {"name": "calculator"}
                }),
                "tools/list" => json!({"tools": [
                    {
                        "name": "add",
                        "description": "Add two numbers",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"a": {"type": "number"}, "b": {"type": "number"}}
                        }
                    },
                    {"name": "divide", "inputSchema": {"properties": {}}}
                ]}),
                "tools/call" => {
                    self.probe.invocations.fetch_add(1, Ordering::SeqCst);
                    let args = &params["arguments"];
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    match params["name"].as_str() {
                        Some("add") => json!({"content": [{"type": "text", "text": format!("{}", a + b)}]}),
                        _ if b == 0.0 => json!({
                            "content": [{"type": "text", "text": "division by zero"}],
                            "isError": true
                        }),
                        _ => json!({"content": [{"type": "text", "text": format!("{}", a / b)}]}),
                    }
                }
                other => {
                    return Ok(reply(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "error": {"code": -32601, "message": format!("Method not found: {other}")}
                    })));
                }
            };
            Ok(reply(json!({"jsonrpc": "2.0", "id": 1, "result": result})))
        })
    }

    fn notify<'a>(
        &'a self,
        _method: &'a str,
        _params: Option<Value>,
    ) -> BoxFuture<'a, Result<(), McpError>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            if !self.closed {
                self.closed = true;
                self.probe.closes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }

    fn abort(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// Event capture
// ---------------------------------------------------------------------------

/// Collects events from a run callback.
pub fn capture() -> (Arc<Mutex<Vec<RunEvent>>>, impl FnMut(RunEvent)) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event| sink.lock().unwrap().push(event))
}
