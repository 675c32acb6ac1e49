//! A live, handshaken connection to one provider.
//!
//! Handles the protocol handshake (`initialize` + `notifications/initialized`),
//! the one-time tool listing (`tools/list`), and tool invocation
//! (`tools/call`).

use crate::error::McpError;
use crate::transport::Transport;
use serde::Deserialize;

/// Protocol version we negotiate.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages followed for one provider.
const MAX_LIST_PAGES: usize = 64;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Closed,
}

/// Result of calling a tool on a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpToolContent>,
    #[serde(default, rename = "structuredContent")]
    pub structured: Option<serde_json::Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl McpToolResult {
    /// Flatten the result into the text handed back to the model.
    pub fn to_text(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .map(|c| match c {
                McpToolContent::Text { text } => text.clone(),
                McpToolContent::Image { mime_type, .. } => format!("[image: {mime_type}]"),
                McpToolContent::Resource { resource } => resource
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| resource.to_string()),
            })
            .collect();

        if parts.is_empty() {
            return self
                .structured
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
        }
        parts.join("\n")
    }
}

/// A content item in a tool result.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum McpToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: serde_json::Value,
    },
}

#[derive(Deserialize)]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<serde_json::Value>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Deserialize, Default)]
struct InitializeResult {
    #[serde(default, rename = "serverInfo")]
    server_info: Option<ServerInfo>,
    #[serde(default, rename = "protocolVersion")]
    protocol_version: Option<String>,
}

/// Identity a provider reports during the handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// One provider session.
pub struct Session {
    provider: String,
    transport: Box<dyn Transport>,
    state: SessionState,
    tools: Vec<serde_json::Value>,
    server_info: Option<ServerInfo>,
}

impl Session {
    /// Handshake over `transport` and capture the provider's tool list.
    ///
    /// On failure the transport is closed before the error is returned.
    pub async fn create(
        provider: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, McpError> {
        let mut session = Self {
            provider: provider.into(),
            transport,
            state: SessionState::Connecting,
            tools: Vec::new(),
            server_info: None,
        };

        match session.establish().await {
            Ok(()) => {
                session.state = SessionState::Ready;
                tracing::debug!(
                    "Session '{}' ready over {} ({} tools)",
                    session.provider,
                    session.transport.kind(),
                    session.tools.len()
                );
                Ok(session)
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<(), McpError> {
        self.handshake().await.map_err(|e| match e {
            e @ (McpError::Connection { .. } | McpError::Handshake { .. }) => e,
            other => McpError::Handshake {
                provider: self.provider.clone(),
                message: other.to_string(),
            },
        })?;
        self.tools = self.list_tools().await?;
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "tether",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self
            .transport
            .request("initialize", Some(params))
            .await?
            .into_result(&self.provider)?;

        let init: InitializeResult = serde_json::from_value(result).unwrap_or_default();
        match init.protocol_version.as_deref() {
            Some(PROTOCOL_VERSION) | None => {}
            Some(version) => tracing::debug!(
                "Provider '{}' negotiated protocol {version} (requested {PROTOCOL_VERSION})",
                self.provider
            ),
        }
        self.server_info = init.server_info;

        self.transport
            .notify("notifications/initialized", None)
            .await
    }

    /// Fetch the provider's tool descriptions, following pagination.
    async fn list_tools(&self) -> Result<Vec<serde_json::Value>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let result = self
                .transport
                .request("tools/list", params)
                .await?
                .into_result(&self.provider)?;
            let page: ToolsPage = serde_json::from_value(result).map_err(|e| {
                McpError::Protocol(format!("Failed to parse tools/list response: {e}"))
            })?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(
            "Provider '{}' kept paginating tools/list; stopped after {MAX_LIST_PAGES} pages",
            self.provider
        );
        Ok(tools)
    }

    /// Call a tool by its provider-native name. Arguments are passed as-is.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolResult, McpError> {
        if self.state != SessionState::Ready {
            return Err(McpError::SessionClosed {
                provider: self.provider.clone(),
            });
        }

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let tool_err = |message: String| McpError::ToolExecution {
            tool: tool_name.to_string(),
            message,
        };

        let result = match self
            .transport
            .request("tools/call", Some(params))
            .await?
            .into_result(&self.provider)
        {
            Ok(result) => result,
            Err(McpError::JsonRpc { message, .. }) => return Err(tool_err(message)),
            Err(e) => return Err(e),
        };

        let call: McpToolResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to parse tools/call result: {e}")))?;

        if call.is_error {
            return Err(tool_err(call.to_text()));
        }
        Ok(call)
    }

    /// Close the session. Never fails; a second call does nothing.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(e) = self.transport.close().await {
            tracing::warn!("Error while closing provider '{}': {e}", self.provider);
        }
        self.state = SessionState::Closed;
        tracing::debug!("Session '{}' closed", self.provider);
    }

    /// Release the transport without awaiting, for drop paths.
    pub(crate) fn abort(&mut self) {
        if self.state != SessionState::Closed {
            self.transport.abort();
            self.state = SessionState::Closed;
        }
    }

    /// Provider-native tool descriptions captured at creation.
    pub fn tools(&self) -> &[serde_json::Value] {
        &self.tools
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }
}
