//! Retry with exponential backoff for model requests.

use rand::Rng;
use tether_types::InvocationError;

/// Configuration for retry behavior on transient model errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

/// Whether the error is transient.
pub(crate) fn is_retryable(error: &InvocationError) -> bool {
    matches!(
        error,
        InvocationError::RateLimited { .. }
            | InvocationError::Server { .. }
            | InvocationError::Network(_)
            | InvocationError::Timeout
    )
}

/// Delay in milliseconds before retry number `attempt` (0-based).
///
/// A server-provided `Retry-After` wins (capped at `max_delay_ms`);
/// otherwise `initial_delay_ms * backoff_factor^attempt` with ±25% jitter.
pub(crate) fn calculate_delay(
    config: &RetryConfig,
    attempt: u32,
    retry_after_ms: Option<u64>,
) -> u64 {
    if let Some(server_delay) = retry_after_ms {
        return server_delay.min(config.max_delay_ms);
    }

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent);
    let clamped = base.min(config.max_delay_ms as f64);

    let jitter = rand::rng().random_range(0.75..=1.25);
    ((clamped * jitter) as u64).min(config.max_delay_ms)
}
