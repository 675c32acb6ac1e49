//! The model-invocation boundary.

use crate::{InvocationError, Message, ToolDescriptor};
use std::future::Future;
use std::pin::Pin;

/// Everything the model sees for one turn.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDescriptor],
}

/// A conversational model that may answer with tool-call requests.
///
/// Dyn-compatible so the orchestrator works with `Arc<dyn Model>`.
pub trait Model: Send + Sync {
    /// Produce the next assistant message for the given conversation.
    fn complete<'a>(
        &'a self,
        request: ModelRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Message, InvocationError>> + Send + 'a>>;

    /// Model name for logging/display.
    fn name(&self) -> &str;
}
