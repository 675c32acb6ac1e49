//! Chat-completions model client for Tether.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint and exposes
//! it through the [`tether_types::model::Model`] boundary.

mod client;
mod retry;
mod wire;

pub use client::ChatClient;
pub use retry::RetryConfig;
