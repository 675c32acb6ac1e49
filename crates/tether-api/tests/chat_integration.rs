//! Integration tests for `ChatClient` against a raw TCP test server.
//!
//! Simulates an OpenAI-compatible endpoint returning tool calls, text, and
//! retryable errors (429, 500).
//!
//! Run with: `cargo test -p tether-api --test chat_integration -- --ignored`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tether_api::{ChatClient, RetryConfig};
use tether_types::model::{Model, ModelRequest};
use tether_types::{InvocationError, Message, ToolDescriptor};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const TOOL_CALL_BODY: &str = r#"{"id":"chatcmpl-1","object":"chat.completion","choices":[{"index":0,"message":{"role":"assistant","content":null,"tool_calls":[{"id":"call_abc","type":"function","function":{"name":"get_weather","arguments":"{\"location\":\"San Francisco, CA\"}"}}]},"finish_reason":"tool_calls"}]}"#;

const TEXT_BODY: &str = r#"{"id":"chatcmpl-2","object":"chat.completion","choices":[{"index":0,"message":{"role":"assistant","content":"It is 70 degrees."},"finish_reason":"stop"}]}"#;

fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: application/json\r\n\
         {extra_headers}\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

fn ok(body: &str) -> String {
    http_response("200 OK", "", body)
}

fn http_429() -> String {
    http_response(
        "429 Too Many Requests",
        "Retry-After: 0.01\r\n",
        r#"{"error":{"message":"rate limited"}}"#,
    )
}

fn http_500() -> String {
    http_response(
        "500 Internal Server Error",
        "",
        r#"{"error":{"message":"internal error"}}"#,
    )
}

fn http_401() -> String {
    http_response(
        "401 Unauthorized",
        "",
        r#"{"error":{"message":"invalid api key"}}"#,
    )
}

/// Start a test server that answers connection N with `responses[N]`.
/// Returns the base URL, a request counter, and the captured request texts.
async fn start_test_server(
    responses: Vec<String>,
) -> (String, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let captured = Arc::new(Mutex::new(Vec::new()));
    let counter_clone = Arc::clone(&counter);
    let captured_clone = Arc::clone(&captured);

    tokio::spawn(async move {
        let responses = Arc::new(responses);
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let idx = counter_clone.fetch_add(1, Ordering::SeqCst);
            let responses = Arc::clone(&responses);
            let captured = Arc::clone(&captured_clone);

            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = vec![0u8; 8192];
                // Read until the declared body has arrived
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request);
                    if let Some(end) = text.find("\r\n\r\n") {
                        let declared = text[..end]
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .and_then(|v| v.trim().parse::<usize>().ok())
                            })
                            .unwrap_or(0);
                        if request.len() >= end + 4 + declared {
                            break;
                        }
                    }
                }
                captured
                    .lock()
                    .await
                    .push(String::from_utf8_lossy(&request).to_string());

                if idx < responses.len() {
                    let _ = socket.write_all(responses[idx].as_bytes()).await;
                    let _ = socket.flush().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}/v1"), counter, captured)
}

fn make_client(base_url: &str) -> ChatClient {
    ChatClient::new("test-key", base_url, "test-model")
        .unwrap()
        .with_parallel_tool_calls(Some(false))
        .with_retry_config(RetryConfig {
            max_retries: 2,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_factor: 2.0,
        })
}

fn weather_tool() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor::new(
        "get_weather",
        "Get the weather",
        serde_json::json!({"type": "object", "properties": {"location": {"type": "string"}}}),
    )]
}

#[tokio::test]
#[ignore]
async fn test_tool_call_response() {
    let (url, counter, captured) = start_test_server(vec![ok(TOOL_CALL_BODY)]).await;
    let client = make_client(&url);
    let conversation = vec![Message::user("What's the weather in San Francisco?")];
    let tools = weather_tool();

    let msg = client
        .complete(ModelRequest {
            system: "You are a helpful assistant. Talk in english.",
            messages: &conversation,
            tools: &tools,
        })
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(msg.tool_calls.len(), 1);
    assert_eq!(msg.tool_calls[0].id, "call_abc");
    assert_eq!(
        msg.tool_calls[0].parsed_arguments()["location"],
        "San Francisco, CA"
    );

    let request = captured.lock().await[0].clone();
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(request.to_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains(r#""parallel_tool_calls":false"#));
    assert!(request.contains(r#""role":"system""#));
}

#[tokio::test]
#[ignore]
async fn test_text_response() {
    let (url, _, _) = start_test_server(vec![ok(TEXT_BODY)]).await;
    let client = make_client(&url);
    let conversation = vec![Message::user("And now?")];

    let msg = client
        .chat(ModelRequest {
            system: "",
            messages: &conversation,
            tools: &[],
        })
        .await
        .unwrap();
    assert_eq!(msg.text(), "It is 70 degrees.");
    assert!(!msg.has_tool_calls());
}

#[tokio::test]
#[ignore]
async fn test_retry_on_429_then_500_then_success() {
    let (url, counter, _) =
        start_test_server(vec![http_429(), http_500(), ok(TEXT_BODY)]).await;
    let client = make_client(&url);
    let conversation = vec![Message::user("hi")];

    let msg = client
        .chat(ModelRequest {
            system: "",
            messages: &conversation,
            tools: &[],
        })
        .await
        .unwrap();
    assert_eq!(msg.text(), "It is 70 degrees.");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
#[ignore]
async fn test_retry_exhausted() {
    let (url, counter, _) = start_test_server(vec![http_500(), http_500(), http_500()]).await;
    let client = make_client(&url);
    let conversation = vec![Message::user("hi")];

    let result = client
        .chat(ModelRequest {
            system: "",
            messages: &conversation,
            tools: &[],
        })
        .await;
    assert!(matches!(
        result,
        Err(InvocationError::Server { status: 500, .. })
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
#[ignore]
async fn test_no_retry_on_401() {
    let (url, counter, _) = start_test_server(vec![http_401(), ok(TEXT_BODY)]).await;
    let client = make_client(&url);
    let conversation = vec![Message::user("hi")];

    match client
        .chat(ModelRequest {
            system: "",
            messages: &conversation,
            tools: &[],
        })
        .await
    {
        Err(InvocationError::Auth { message }) => assert_eq!(message, "invalid api key"),
        other => panic!("Expected Auth, got {other:?}"),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
