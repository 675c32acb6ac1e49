//! Chat-completions client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tether_types::model::{Model, ModelRequest};
use tether_types::{InvocationError, Message};

use crate::retry::{RetryConfig, calculate_delay, is_retryable};
use crate::wire::{ChatRequest, ChatResponse};

/// Upper bound on a single completion request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    parallel_tool_calls: Option<bool>,
    retry_config: RetryConfig,
}

impl ChatClient {
    /// Create a new client. `base_url` is the API root, e.g.
    /// `https://api.openai.com/v1`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, InvocationError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InvocationError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            parallel_tool_calls: None,
            retry_config: RetryConfig::default(),
        })
    }

    /// Set the retry configuration for transient errors (429, 5xx, network).
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Ask the model to emit at most one tool call per turn (`Some(false)`),
    /// or leave the endpoint default (`None`).
    pub fn with_parallel_tool_calls(mut self, parallel: Option<bool>) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap, InvocationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !self.api_key.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(
                |_| InvocationError::Auth {
                    message: "Invalid API key format".into(),
                },
            )?;
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(headers)
    }

    /// Send one completion request, retrying transient failures.
    pub async fn chat(&self, request: ModelRequest<'_>) -> Result<Message, InvocationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.headers()?;
        let body = ChatRequest::build(&self.model, request, self.parallel_tool_calls);
        let body = serde_json::to_string(&body).map_err(|e| InvocationError::BadRequest {
            message: format!("Failed to serialize request: {e}"),
        })?;

        let mut attempt = 0;
        loop {
            tracing::debug!(
                "POST {url} (attempt {}/{})",
                attempt + 1,
                self.retry_config.max_retries + 1
            );

            let result = self
                .http
                .post(&url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;

            let (err, retry_after) = match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: ChatResponse = response
                            .json()
                            .await
                            .map_err(|e| InvocationError::Decode(e.to_string()))?;
                        return parsed.into_message();
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body_text = response.text().await.unwrap_or_default();
                    (
                        classify_error(status.as_u16(), &body_text, retry_after),
                        retry_after,
                    )
                }
                Err(e) if e.is_timeout() => (InvocationError::Timeout, None),
                Err(e) => (InvocationError::Network(e.to_string()), None),
            };

            if !is_retryable(&err) || attempt >= self.retry_config.max_retries {
                return Err(err);
            }

            let delay = calculate_delay(&self.retry_config, attempt, retry_after);
            tracing::warn!(
                "Retryable model error (attempt {}/{}): {err}. Retrying in {delay}ms...",
                attempt + 1,
                self.retry_config.max_retries,
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }
}

impl Model for ChatClient {
    fn complete<'a>(
        &'a self,
        request: ModelRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Message, InvocationError>> + Send + 'a>> {
        Box::pin(self.chat(request))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Parse the `retry-after` header value as seconds and convert to milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
}

/// Classify an HTTP error response into a typed InvocationError.
fn classify_error(status: u16, body: &str, retry_after: Option<u64>) -> InvocationError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => InvocationError::Auth { message },
        400 | 404 | 422 => InvocationError::BadRequest { message },
        429 => InvocationError::RateLimited {
            retry_after_ms: retry_after,
        },
        _ => InvocationError::Server { status, message },
    }
}
