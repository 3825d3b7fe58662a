//! OpenAI chat completions adapter.

use crate::{
    ensure_linked, error::ProviderError, http, message::Role, normalize_arguments,
    AssistantTurn, Conversation, ModelSettings, ProviderAdapter, ProviderResult, ToolCall,
    ToolDefinition,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use tracing::info;

/// The OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI adapter. Also works against compatible endpoints via `base_url`.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: &str, base_url: Option<&str>) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| ProviderError::InvalidApiKey("openai".into()))?,
        );

        Ok(Self {
            client: http::client(headers)?,
            base_url: base_url
                .unwrap_or(OPENAI_API_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Encode a conversation as a chat completions request body.
pub fn build_request(
    conversation: &Conversation,
    tools: &[ToolDefinition],
    settings: &ModelSettings,
) -> ProviderResult<Value> {
    ensure_linked(conversation)?;

    let mut messages = Vec::with_capacity(conversation.len() + 1);
    if let Some(system) = &settings.system_prompt {
        messages.push(json!({ "role": "system", "content": system }));
    }

    for msg in conversation.messages() {
        let encoded = match msg.role {
            Role::User => json!({ "role": "user", "content": msg.content }),
            Role::Assistant if msg.has_tool_calls() => {
                let calls = msg
                    .tool_calls
                    .iter()
                    .map(|call| -> ProviderResult<Value> {
                        Ok(json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": serde_json::to_string(&call.arguments)?,
                            }
                        }))
                    })
                    .collect::<ProviderResult<Vec<_>>>()?;
                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(msg.content.clone())
                };
                json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            Role::Assistant => json!({ "role": "assistant", "content": msg.content }),
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id,
                "content": msg.content,
            }),
        };
        messages.push(encoded);
    }

    let mut body = json!({
        "model": settings.model_id(),
        "max_tokens": settings.max_tokens,
        "temperature": settings.temperature,
        "messages": messages,
    });
    if !tools.is_empty() {
        body["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
    }

    Ok(body)
}

/// Decode a chat completions response body.
pub fn parse_response(body: &Value) -> ProviderResult<AssistantTurn> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| ProviderError::invalid_response("response has no choices"))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut calls = Vec::new();
    for call in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let id = call.get("id").and_then(Value::as_str);
        let name = call.pointer("/function/name").and_then(Value::as_str);
        let (Some(id), Some(name)) = (id, name) else {
            return Err(ProviderError::invalid_response(
                "tool call without id or function name",
            ));
        };
        let arguments = call
            .pointer("/function/arguments")
            .cloned()
            .unwrap_or(Value::Null);
        calls.push(ToolCall::new(id, name, normalize_arguments(arguments)));
    }

    Ok(AssistantTurn::from_parts(text, calls))
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> ProviderResult<AssistantTurn> {
        let body = build_request(conversation, tools, settings)?;
        info!(
            model = %settings.model_id(),
            message_count = conversation.len(),
            tool_count = tools.len(),
            "Sending OpenAI API request"
        );

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url));
        let response = http::post_json(request, &body, self.provider_id()).await?;
        parse_response(&response)
    }

    fn provider_id(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> ModelSettings {
        ModelSettings {
            model: "gpt-test".into(),
            system_prompt: Some("sys".into()),
            ..ModelSettings::default()
        }
    }

    #[test]
    fn test_build_request_shape() {
        let conv = Conversation::from(vec![
            Message::user("list"),
            Message::assistant_with_calls(
                "",
                vec![ToolCall::new("call_1", "list_files", json!({"path": "/etc"}))],
            ),
            Message::tool_error("call_1", "denied"),
        ]);
        let tools = vec![ToolDefinition {
            name: "list_files".into(),
            description: "List".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = build_request(&conv, &tools, &settings()).unwrap();

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            "{\"path\":\"/etc\"}"
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "list_files");
    }

    #[test]
    fn test_round_trip_preserves_ids_and_arguments() {
        let original = ToolCall::new(
            "call_abc",
            "write_file",
            json!({"path": "x.txt", "content": "hi\n", "create_backup": false}),
        );
        let conv = Conversation::from(vec![
            Message::user("write"),
            Message::assistant_with_calls("ok", vec![original.clone()]),
            Message::tool_result("call_abc", "Wrote 3 bytes"),
        ]);
        let body = build_request(&conv, &[], &ModelSettings::default()).unwrap();

        let response = json!({ "choices": [{ "message": body["messages"][1] }] });
        let AssistantTurn::ToolRequests { text, calls } = parse_response(&response).unwrap()
        else {
            panic!("expected tool requests");
        };
        assert_eq!(text, "ok");
        assert_eq!(calls, vec![original]);
        assert_eq!(body["messages"][2]["tool_call_id"], "call_abc");
        assert_eq!(body["messages"][2]["content"], "Wrote 3 bytes");
    }

    #[test]
    fn test_parse_keeps_unparsable_arguments() {
        let response = json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{
                    "id": "c", "type": "function",
                    "function": { "name": "read_file", "arguments": "{path: oops" }
                }]
            }}]
        });
        let AssistantTurn::ToolRequests { calls, .. } = parse_response(&response).unwrap() else {
            panic!("expected tool requests");
        };
        assert_eq!(calls[0].arguments, json!("{path: oops"));
    }

    #[test]
    fn test_parse_repeated_ids_are_replaced() {
        let response = json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [
                    { "id": "call_0", "type": "function",
                      "function": { "name": "read_file", "arguments": "{\"path\": \"a\"}" } },
                    { "id": "call_0", "type": "function",
                      "function": { "name": "read_file", "arguments": "{\"path\": \"b\"}" } }
                ]
            }}]
        });
        let AssistantTurn::ToolRequests { calls, .. } = parse_response(&response).unwrap() else {
            panic!("expected tool requests");
        };
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[1].id, "call_1");
        assert_eq!(calls[1].arguments, json!({"path": "b"}));

        let message = AssistantTurn::ToolRequests { text: String::new(), calls }.to_message();
        let conversation = Conversation::from(vec![
            Message::user("read both"),
            message,
            Message::tool_result("call_0", "A"),
            Message::tool_result("call_1", "B"),
        ]);
        assert!(conversation.check_tool_links().is_ok());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_response(&json!({"choices": []})).is_err());
        let response = json!({ "choices": [{ "message": {
            "tool_calls": [{ "type": "function", "function": { "arguments": "{}" } }]
        }}]});
        assert!(matches!(
            parse_response(&response),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "hello" } }]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new("test-key", Some(&server.uri())).unwrap();
        let turn = adapter
            .send(&Conversation::from_user("hi"), &[], &settings())
            .await
            .unwrap();
        assert_eq!(turn, AssistantTurn::FinalAnswer("hello".into()));
    }

    #[tokio::test]
    async fn test_send_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(json!({"error": {"message": "overloaded"}})),
            )
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new("test-key", Some(&server.uri())).unwrap();
        let err = adapter
            .send(&Conversation::from_user("hi"), &[], &settings())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ProviderError::ApiError { status: 503, message } if message == "overloaded")
        );
        assert!(err.is_retryable());
    }
}
