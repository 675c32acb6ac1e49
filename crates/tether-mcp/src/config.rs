//! Provider configuration.
//!
//! Providers are keyed by name. Each descriptor names a transport and the
//! parameters it needs; resolving a descriptor into a [`Connection`] is
//! deferred so that a bad entry only disables that one provider.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn default_timeout() -> u64 {
    30000
}

fn default_transport() -> String {
    "local".to_string()
}

/// The full set of providers for one run.
///
/// A `BTreeMap` keeps iteration order stable, which decides which provider
/// wins when two expose the same tool name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderDescriptor>,
}

impl ProviderConfig {
    /// Add or replace a provider.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: ProviderDescriptor) {
        self.providers.insert(name.into(), descriptor);
    }

    /// Merge `other` into `self`; entries in `other` replace same-named ones.
    pub fn merge(&mut self, other: ProviderConfig) {
        self.providers.extend(other.providers);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

/// How to reach one provider, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// `local` (alias `stdio`) or `remote-stream` (alias `sse`).
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Command to spawn for local providers (e.g., "npx", "python").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra environment for the spawned process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Event-stream endpoint for remote providers.
    #[serde(default, alias = "endpoint", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Timeout for each request in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl ProviderDescriptor {
    /// A local subprocess provider.
    pub fn local(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: default_transport(),
            command: Some(command.into()),
            args,
            env: HashMap::new(),
            url: None,
            timeout_ms: default_timeout(),
        }
    }

    /// A remote event-stream provider.
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            transport: "remote-stream".to_string(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            timeout_ms: default_timeout(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Resolve the descriptor into a typed connection.
    pub fn connection(&self, provider: &str) -> Result<Connection, McpError> {
        match self.transport.as_str() {
            "local" | "stdio" => {
                let command = self.command.clone().ok_or_else(|| McpError::Connection {
                    provider: provider.to_string(),
                    message: "local transport requires 'command'".to_string(),
                })?;
                Ok(Connection::Local {
                    command,
                    args: self.args.clone(),
                    env: self.env.clone(),
                })
            }
            "remote-stream" | "sse" => {
                let url = self.url.clone().ok_or_else(|| McpError::Connection {
                    provider: provider.to_string(),
                    message: "remote-stream transport requires 'url'".to_string(),
                })?;
                Ok(Connection::RemoteStream { url })
            }
            other => Err(McpError::UnsupportedTransport {
                provider: provider.to_string(),
                transport: other.to_string(),
            }),
        }
    }
}

/// A resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Local {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    RemoteStream {
        url: String,
    },
}
