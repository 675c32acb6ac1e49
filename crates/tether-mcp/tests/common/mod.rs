//! Scripted in-memory providers for exercising sessions and the manager.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tether_mcp::jsonrpc::JsonRpcResponse;
use tether_mcp::{
    BoxFuture, Connection, Connector, McpError, ProviderConfig, ProviderDescriptor, Transport,
    TransportKind,
};

/// Shared counters a test inspects after the transport is gone.
#[derive(Clone, Default)]
pub struct Probe {
    pub closes: Arc<AtomicUsize>,
    pub aborts: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Probe {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[derive(Clone)]
enum Behavior {
    Refuse,
    Serve {
        tools: Vec<Value>,
        fail_handshake: bool,
    },
}

/// A connector whose providers are scripted per name.
#[derive(Default)]
pub struct MockConnector {
    behaviors: HashMap<String, Behavior>,
    probes: HashMap<String, Probe>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that answers the handshake and lists `tools`.
    pub fn serve(mut self, name: &str, tools: Vec<Value>) -> Self {
        self.behaviors.insert(
            name.to_string(),
            Behavior::Serve {
                tools,
                fail_handshake: false,
            },
        );
        self.probes.insert(name.to_string(), Probe::default());
        self
    }

    /// A provider whose transport cannot be opened.
    pub fn refuse(mut self, name: &str) -> Self {
        self.behaviors.insert(name.to_string(), Behavior::Refuse);
        self.probes.insert(name.to_string(), Probe::default());
        self
    }

    /// A provider that connects but rejects `initialize`.
    pub fn fail_handshake(mut self, name: &str) -> Self {
        self.behaviors.insert(
            name.to_string(),
            Behavior::Serve {
                tools: vec![],
                fail_handshake: true,
            },
        );
        self.probes.insert(name.to_string(), Probe::default());
        self
    }

    pub fn probe(&self, name: &str) -> Probe {
        self.probes[name].clone()
    }

    /// A config naming every scripted provider.
    pub fn config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::default();
        for name in self.behaviors.keys() {
            config.insert(name.clone(), ProviderDescriptor::local("mock", vec![]));
        }
        config
    }
}

impl Connector for MockConnector {
    fn open<'a>(
        &'a self,
        provider: &'a str,
        _connection: &'a Connection,
        _timeout_ms: u64,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>, McpError>> {
        Box::pin(async move {
            match self.behaviors.get(provider) {
                Some(Behavior::Serve {
                    tools,
                    fail_handshake,
                }) => Ok(Box::new(MockTransport {
                    tools: tools.clone(),
                    fail_handshake: *fail_handshake,
                    probe: self.probes[provider].clone(),
                    closed: false,
                }) as Box<dyn Transport>),
                _ => Err(McpError::Connection {
                    provider: provider.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        })
    }
}

pub struct MockTransport {
    tools: Vec<Value>,
    fail_handshake: bool,
    probe: Probe,
    closed: bool,
}

fn response(result: Value) -> JsonRpcResponse {
    serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": result})).unwrap()
}

fn error_response(code: i64, message: &str) -> JsonRpcResponse {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {"code": code, "message": message}
    }))
    .unwrap()
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>> {
        Box::pin(async move {
            let resp = match method {
                "initialize" if self.fail_handshake => error_response(-32602, "unsupported version"),
                "initialize" => response(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "mock", "version": "0.1.0"}
                })),
                "tools/list" => response(json!({"tools": self.tools})),
                "tools/call" => {
                    let params = params.unwrap_or_default();
                    let name = params["name"].as_str().unwrap_or_default().to_string();
                    let args = params["arguments"].clone();
                    self.probe.calls.lock().unwrap().push((name.clone(), args.clone()));
                    match name.as_str() {
                        "explode" => response(json!({
                            "content": [{"type": "text", "text": "boom"}],
                            "isError": true
                        })),
                        "reject" => error_response(-32000, "rejected by provider"),
                        _ => response(json!({
                            "content": [{"type": "text", "text": format!("{name} ok: {args}")}]
                        })),
                    }
                }
                other => error_response(-32601, &format!("Method not found: {other}")),
            };
            Ok(resp)
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

pub fn tool(name: &str) -> Value {
    json!({
        "name": name,
        "description": format!("The {name} tool"),
        "inputSchema": {"type": "object", "properties": {}}
    })
}
