//! Session manager: opens every configured provider, unifies their tool
//! catalogs, routes invocations, and guarantees release.

use crate::catalog;
use crate::config::{ProviderConfig, ProviderDescriptor};
use crate::error::McpError;
use crate::session::{Session, SessionState};
use crate::transport::{Connector, DefaultConnector};
use std::collections::HashMap;
use tether_types::ToolDescriptor;

/// Index of a session in the manager's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(usize);

/// Where a unified tool name is executed.
#[derive(Debug, Clone)]
struct DispatchEntry {
    session: SessionId,
    native_name: String,
}

/// A provider that could not be brought up.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

/// Owns every provider session for one orchestration run.
///
/// The dispatch table is built once by [`SessionManager::initialize`] and is
/// read-only afterwards. Call [`SessionManager::teardown`] on every exit
/// path; if the manager is dropped without it (cancelled future, panic),
/// `Drop` releases the transports synchronously.
pub struct SessionManager {
    sessions: Vec<Session>,
    dispatch: HashMap<String, DispatchEntry>,
    catalog: Vec<ToolDescriptor>,
    failures: Vec<ProviderFailure>,
    torn_down: bool,
}

impl SessionManager {
    /// A manager with no providers.
    pub fn empty() -> Self {
        Self {
            sessions: Vec::new(),
            dispatch: HashMap::new(),
            catalog: Vec::new(),
            failures: Vec::new(),
            torn_down: false,
        }
    }

    /// Open every configured provider over the real transports.
    pub async fn initialize(config: &ProviderConfig) -> Self {
        Self::initialize_with(config, &DefaultConnector).await
    }

    /// Open every configured provider through `connector`.
    ///
    /// Providers that fail at any step are logged and skipped; the rest
    /// still come up.
    pub async fn initialize_with(config: &ProviderConfig, connector: &dyn Connector) -> Self {
        let mut manager = Self::empty();

        for (name, descriptor) in &config.providers {
            match open_session(name, descriptor, connector).await {
                Ok(session) => {
                    tracing::info!(
                        "Provider '{}' started ({} tools)",
                        name,
                        session.tools().len()
                    );
                    manager.register(session);
                }
                Err(e) => {
                    tracing::warn!("Failed to start provider '{}': {}", name, e);
                    manager.failures.push(ProviderFailure {
                        provider: name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        manager
    }

    /// Add a ready session's tools to the catalog; first name wins.
    fn register(&mut self, session: Session) {
        let id = SessionId(self.sessions.len());

        for native in session.tools() {
            let tool = match catalog::normalize(native) {
                Ok(tool) => tool,
                Err(e) => {
                    tracing::warn!("Skipping tool from '{}': {}", session.provider(), e);
                    continue;
                }
            };

            if let Some(existing) = self.dispatch.get(&tool.name) {
                let owner = self.sessions[existing.session.0].provider();
                tracing::warn!(
                    "Tool '{}' from '{}' shadowed by '{}'; keeping the first",
                    tool.name,
                    session.provider(),
                    owner
                );
                continue;
            }

            let native_name = native
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(&tool.name)
                .to_string();
            self.dispatch.insert(
                tool.name.clone(),
                DispatchEntry {
                    session: id,
                    native_name,
                },
            );
            self.catalog.push(tool);
        }

        self.sessions.push(session);
    }

    /// Unified provider catalog, in registration order.
    pub fn catalog(&self) -> &[ToolDescriptor] {
        &self.catalog
    }

    /// Whether `tool_name` is routed to a provider.
    pub fn contains(&self, tool_name: &str) -> bool {
        self.dispatch.contains_key(tool_name)
    }

    /// Name of the provider that owns `tool_name`.
    pub fn owner_of(&self, tool_name: &str) -> Option<&str> {
        self.dispatch
            .get(tool_name)
            .map(|entry| self.sessions[entry.session.0].provider())
    }

    /// Execute a provider tool and flatten its result to text.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, McpError> {
        let unknown = || McpError::UnknownTool {
            name: tool_name.to_string(),
        };
        let entry = self.dispatch.get(tool_name).ok_or_else(unknown)?;
        let session = self.sessions.get(entry.session.0).ok_or_else(unknown)?;

        tracing::debug!("Invoking '{}' on '{}'", tool_name, session.provider());
        let result = session.invoke(&entry.native_name, arguments).await?;
        Ok(result.to_text())
    }

    /// Number of sessions currently ready.
    pub fn session_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.state() == SessionState::Ready)
            .count()
    }

    /// Each registered provider with the tools it contributed.
    pub fn server_summary(&self) -> Vec<(&str, usize)> {
        self.sessions
            .iter()
            .enumerate()
            .map(|(idx, s)| {
                let tools = self
                    .dispatch
                    .values()
                    .filter(|entry| entry.session.0 == idx)
                    .count();
                (s.provider(), tools)
            })
            .collect()
    }

    /// State of every registered session.
    pub fn session_states(&self) -> Vec<(&str, SessionState)> {
        self.sessions
            .iter()
            .map(|s| (s.provider(), s.state()))
            .collect()
    }

    /// Providers that failed to start.
    pub fn failures(&self) -> &[ProviderFailure] {
        &self.failures
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Close every ready session and return how many were closed.
    ///
    /// Individual close failures are logged inside [`Session::close`].
    /// Calls after the first do nothing and return 0.
    pub async fn teardown(&mut self) -> usize {
        if self.torn_down {
            return 0;
        }
        self.torn_down = true;

        let mut closed = 0;
        for session in &mut self.sessions {
            if session.state() == SessionState::Ready {
                session.close().await;
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::info!("Closed {closed} provider session(s)");
        }
        closed
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        let open = self.session_count();
        if open > 0 {
            tracing::warn!("Session manager dropped without teardown; aborting {open} session(s)");
        }
        for session in &mut self.sessions {
            session.abort();
        }
    }
}

async fn open_session(
    name: &str,
    descriptor: &ProviderDescriptor,
    connector: &dyn Connector,
) -> Result<Session, McpError> {
    let connection = descriptor.connection(name)?;
    let transport = connector
        .open(name, &connection, descriptor.timeout_ms)
        .await?;
    Session::create(name, transport).await
}
