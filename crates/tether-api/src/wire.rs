//! Request and response bodies for the chat-completions endpoint.

use serde::{Deserialize, Serialize};
use tether_types::model::ModelRequest;
use tether_types::{InvocationError, Message, Role, ToolCall};

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl<'a> ChatRequest<'a> {
    /// Build the body: system prompt first, then the conversation.
    pub fn build(model: &'a str, request: ModelRequest<'a>, parallel: Option<bool>) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(WireMessage {
                role: Role::System,
                content: Some(request.system),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.extend(request.messages.iter().map(WireMessage::from));

        let tools: Vec<serde_json::Value> =
            request.tools.iter().map(|t| t.function_schema()).collect();
        // The endpoint rejects parallel_tool_calls without tools
        let parallel_tool_calls = if tools.is_empty() { None } else { parallel };

        Self {
            model,
            messages,
            tools,
            parallel_tool_calls,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.as_deref(),
            tool_calls: msg.tool_calls.iter().map(WireToolCall::from).collect(),
            tool_call_id: msg.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireToolCall<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction<'a>,
}

impl<'a> From<&'a ToolCall> for WireToolCall<'a> {
    fn from(call: &'a ToolCall) -> Self {
        Self {
            id: &call.id,
            kind: "function",
            function: WireFunction {
                name: &call.name,
                arguments: &call.arguments,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireFunction<'a> {
    pub name: &'a str,
    pub arguments: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ReturnedToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ReturnedToolCall {
    id: String,
    function: ReturnedFunction,
}

#[derive(Debug, Deserialize)]
struct ReturnedFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl ChatResponse {
    /// The first choice as an assistant message.
    pub fn into_message(self) -> Result<Message, InvocationError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InvocationError::Decode("response has no choices".into()))?;

        let calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
            .collect();

        if calls.is_empty() {
            Ok(Message::assistant(choice.message.content.unwrap_or_default()))
        } else {
            Ok(Message::assistant_with_calls(choice.message.content, calls))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_types::ToolDescriptor;

    #[test]
    fn request_puts_system_prompt_first() {
        let conversation = vec![Message::user("What's the weather in Paris?")];
        let tools = vec![ToolDescriptor::new(
            "get_weather",
            "Weather",
            json!({"type": "object", "properties": {}}),
        )];
        let request = ModelRequest {
            system: "You are a helpful assistant. Talk in english.",
            messages: &conversation,
            tools: &tools,
        };

        let body = serde_json::to_value(ChatRequest::build("gpt-4o", request, Some(false))).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What's the weather in Paris?");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
        assert_eq!(body["parallel_tool_calls"], false);
    }

    #[test]
    fn request_without_tools_omits_tool_fields() {
        let conversation = vec![Message::user("hi")];
        let request = ModelRequest {
            system: "",
            messages: &conversation,
            tools: &[],
        };
        let body = serde_json::to_value(ChatRequest::build("m", request, Some(false))).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("parallel_tool_calls").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn tool_calls_and_results_use_function_shape() {
        let conversation = vec![
            Message::assistant_with_calls(
                None,
                vec![ToolCall::new("call_1", "add", r#"{"a":1}"#)],
            ),
            Message::tool_result("call_1", "2"),
        ];
        let request = ModelRequest {
            system: "",
            messages: &conversation,
            tools: &[],
        };
        let body = serde_json::to_value(ChatRequest::build("m", request, None)).unwrap();

        let call = &body["messages"][0]["tool_calls"][0];
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["arguments"], r#"{"a":1}"#);
        assert!(body["messages"][0].get("content").is_none());
        assert_eq!(body["messages"][1]["role"], "tool");
        assert_eq!(body["messages"][1]["tool_call_id"], "call_1");
    }

    #[test]
    fn response_with_tool_calls() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"location\":\"Paris\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        let msg = resp.into_message().unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "get_weather");
        assert_eq!(msg.tool_calls[0].parsed_arguments()["location"], "Paris");
    }

    #[test]
    fn response_with_text_only() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}]
        }))
        .unwrap();
        let msg = resp.into_message().unwrap();
        assert_eq!(msg.text(), "Hello!");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn response_without_choices_is_decode_error() {
        let resp: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(resp.into_message(), Err(InvocationError::Decode(_))));
    }
}
