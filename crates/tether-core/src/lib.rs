//! Dispatch loop for Tether.
//!
//! Drives a model through repeated turns, routing each requested tool call
//! to a host action, a local built-in, or a provider session, and releases
//! every provider session before a run returns.

mod orchestrator;
mod toolset;

pub use orchestrator::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_SYSTEM_PROMPT, Orchestrator, RunEvent, RunSummary, StopReason,
    answer_pending_calls,
};
pub use toolset::{ToolKind, ToolSet};
