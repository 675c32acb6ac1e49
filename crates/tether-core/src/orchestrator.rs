//! The dispatch loop: model turn, tool execution, repeat.

use std::collections::HashSet;
use std::sync::Arc;

use tether_mcp::{Connector, DefaultConnector, ProviderConfig, SessionManager};
use tether_tools::LocalToolRegistry;
use tether_types::model::{Model, ModelRequest};
use tether_types::{Message, Role, TetherError, ToolCall, ToolDescriptor};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::toolset::{ToolKind, ToolSet};

/// Model turns that may request tools before a run is stopped.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Talk in english.";

/// Tool output longer than this is shortened in [`RunEvent::ToolEnd`].
const EVENT_OUTPUT_LIMIT: usize = 200;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A provider came up and contributed tools.
    ProviderReady { provider: String, tools: usize },
    /// A provider could not be started; the run continues without it.
    ProviderFailed { provider: String, reason: String },
    /// Text content of an assistant message.
    Text(String),
    /// A tool is about to be executed.
    ToolStart {
        id: String,
        name: String,
        arguments: String,
    },
    /// A tool has finished executing.
    ToolEnd {
        name: String,
        output: String,
        is_error: bool,
    },
    /// The model asked for a host action; the host should carry it out.
    HostAction {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The iteration bound stopped the run.
    IterationLimit { iterations: usize },
    /// The model answered without tool calls.
    Done,
    /// The run was cancelled.
    Cancelled,
    /// The run failed.
    Error(String),
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced a final answer.
    Completed,
    /// The iteration bound was reached; the last tool calls were not run.
    IterationLimit,
    /// The last batch held only host actions.
    HostAction,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub stop: StopReason,
    /// Assistant turns that requested tools.
    pub iterations: usize,
    pub model_calls: usize,
}

/// Drives a model through tool-using turns.
///
/// Holds only per-deployment settings; each run brings its own
/// [`SessionManager`] and conversation, so one orchestrator can serve
/// concurrent runs.
pub struct Orchestrator {
    model: Arc<dyn Model>,
    local_tools: LocalToolRegistry,
    host_actions: Vec<ToolDescriptor>,
    system_prompt: String,
    max_iterations: usize,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            local_tools: LocalToolRegistry::new(),
            host_actions: Vec::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_local_tools(mut self, registry: LocalToolRegistry) -> Self {
        self.local_tools = registry;
        self
    }

    /// Tools the host handles itself. Their names are reserved.
    pub fn with_host_actions(mut self, actions: Vec<ToolDescriptor>) -> Self {
        self.host_actions = actions;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Open the configured providers, then run.
    pub async fn run_with_providers<F>(
        &self,
        config: &ProviderConfig,
        messages: &mut Vec<Message>,
        cancel: CancellationToken,
        on_event: F,
    ) -> Result<RunSummary, TetherError>
    where
        F: FnMut(RunEvent),
    {
        self.run_with_connector(config, &DefaultConnector, messages, cancel, on_event)
            .await
    }

    /// Open the configured providers through `connector`, then run.
    pub async fn run_with_connector<F>(
        &self,
        config: &ProviderConfig,
        connector: &dyn Connector,
        messages: &mut Vec<Message>,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<RunSummary, TetherError>
    where
        F: FnMut(RunEvent),
    {
        async move {
            let manager = tokio::select! {
                _ = cancel.cancelled() => {
                    on_event(RunEvent::Cancelled);
                    return Err(TetherError::Cancelled);
                }
                manager = SessionManager::initialize_with(config, connector) => manager,
            };

            for (provider, tools) in manager.server_summary() {
                on_event(RunEvent::ProviderReady {
                    provider: provider.to_string(),
                    tools,
                });
            }
            for failure in manager.failures() {
                on_event(RunEvent::ProviderFailed {
                    provider: failure.provider.clone(),
                    reason: failure.reason.clone(),
                });
            }

            self.run_owned(manager, messages, cancel, on_event).await
        }
        .instrument(run_span())
        .await
    }

    /// Run the dispatch loop over `messages` using the sessions in `manager`.
    ///
    /// Every assistant message and tool result is appended to `messages`.
    /// The manager is torn down before this returns, whatever the outcome.
    pub async fn run<F>(
        &self,
        manager: SessionManager,
        messages: &mut Vec<Message>,
        cancel: CancellationToken,
        on_event: F,
    ) -> Result<RunSummary, TetherError>
    where
        F: FnMut(RunEvent),
    {
        self.run_owned(manager, messages, cancel, on_event)
            .instrument(run_span())
            .await
    }

    async fn run_owned<F>(
        &self,
        mut manager: SessionManager,
        messages: &mut Vec<Message>,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<RunSummary, TetherError>
    where
        F: FnMut(RunEvent),
    {
        let tools = ToolSet::build(
            &self.host_actions,
            &self.local_tools.definitions(),
            manager.catalog(),
        );
        tracing::info!(
            "Run started: {} tool(s), {} provider session(s), bound {}",
            tools.len(),
            manager.session_count(),
            self.max_iterations
        );

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(TetherError::Cancelled),
            result = self.drive(&tools, &manager, messages, &mut on_event) => result,
        };

        match &outcome {
            Ok(summary) => tracing::info!(
                "Run finished: {:?} after {} iteration(s)",
                summary.stop,
                summary.iterations
            ),
            Err(TetherError::Cancelled) => {
                tracing::info!("Run cancelled");
                on_event(RunEvent::Cancelled);
            }
            Err(e) => {
                tracing::warn!("Run failed: {e}");
                on_event(RunEvent::Error(e.to_string()));
            }
        }

        manager.teardown().await;
        outcome
    }

    async fn drive<F>(
        &self,
        tools: &ToolSet,
        manager: &SessionManager,
        messages: &mut Vec<Message>,
        on_event: &mut F,
    ) -> Result<RunSummary, TetherError>
    where
        F: FnMut(RunEvent),
    {
        let mut iterations = 0;
        let mut model_calls = 0;

        loop {
            let request = ModelRequest {
                system: &self.system_prompt,
                messages: messages.as_slice(),
                tools: tools.descriptors(),
            };
            let reply = self.model.complete(request).await?;
            model_calls += 1;

            if !reply.text().is_empty() {
                on_event(RunEvent::Text(reply.text().to_string()));
            }
            let calls = reply.tool_calls.clone();
            messages.push(reply);

            if calls.is_empty() {
                on_event(RunEvent::Done);
                return Ok(RunSummary {
                    stop: StopReason::Completed,
                    iterations,
                    model_calls,
                });
            }

            iterations += 1;
            if iterations >= self.max_iterations {
                tracing::info!(
                    "Iteration limit ({}) reached; {} tool call(s) not executed",
                    self.max_iterations,
                    calls.len()
                );
                on_event(RunEvent::IterationLimit { iterations });
                return Ok(RunSummary {
                    stop: StopReason::IterationLimit,
                    iterations,
                    model_calls,
                });
            }

            let mut answered = 0;
            for call in &calls {
                if let Some(output) = self.dispatch(tools, manager, call, on_event).await {
                    messages.push(Message::tool_result(call.id.clone(), output));
                    answered += 1;
                }
            }

            if answered == 0 {
                tracing::debug!("Batch held only host actions; returning to host");
                return Ok(RunSummary {
                    stop: StopReason::HostAction,
                    iterations,
                    model_calls,
                });
            }
        }
    }

    /// Execute one call. Returns `None` for host actions, which produce no
    /// tool result.
    async fn dispatch<F>(
        &self,
        tools: &ToolSet,
        manager: &SessionManager,
        call: &ToolCall,
        on_event: &mut F,
    ) -> Option<String>
    where
        F: FnMut(RunEvent),
    {
        let arguments = call.parsed_arguments();
        let kind = tools.kind_of(&call.name);

        if kind == Some(ToolKind::HostAction) {
            tracing::debug!("Forwarding host action '{}'", call.name);
            on_event(RunEvent::HostAction {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments,
            });
            return None;
        }

        on_event(RunEvent::ToolStart {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let result = match kind {
            Some(ToolKind::Local) => self
                .local_tools
                .execute(&call.name, &arguments)
                .map_err(|e| e.to_string()),
            Some(ToolKind::Provider) => manager
                .invoke(&call.name, arguments)
                .await
                .map_err(|e| e.to_string()),
            _ => {
                tracing::warn!("Model requested unknown tool '{}'", call.name);
                Ok(format!("Unknown tool: {}", call.name))
            }
        };

        let (output, is_error) = match result {
            Ok(output) => (output, kind.is_none()),
            Err(message) => {
                tracing::debug!("Tool '{}' failed: {message}", call.name);
                (format!("Error: {message}"), true)
            }
        };

        on_event(RunEvent::ToolEnd {
            name: call.name.clone(),
            output: truncate_for_display(&output, EVENT_OUTPUT_LIMIT),
            is_error,
        });
        Some(output)
    }
}

fn run_span() -> tracing::Span {
    tracing::info_span!("run", run_id = %Uuid::new_v4())
}

fn truncate_for_display(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", tether_types::truncate_str(s, max_len))
    }
}

/// Answer every unanswered call of the last tool-requesting assistant
/// message with `text`. Returns how many results were appended.
///
/// A run that stops on the iteration bound, a host action, or cancellation
/// can leave calls without results; most chat endpoints reject such a
/// conversation on the next turn.
pub fn answer_pending_calls(messages: &mut Vec<Message>, text: &str) -> usize {
    let Some(pos) = messages
        .iter()
        .rposition(|m| m.role == Role::Assistant && m.has_tool_calls())
    else {
        return 0;
    };

    let answered: HashSet<&str> = messages[pos + 1..]
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    let pending: Vec<String> = messages[pos]
        .tool_calls
        .iter()
        .filter(|c| !answered.contains(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect();

    let count = pending.len();
    for id in pending {
        messages.push(Message::tool_result(id, text));
    }
    count
}
