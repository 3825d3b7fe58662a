//! Anthropic messages API adapter.

use crate::{
    ensure_linked, error::ProviderError, http, message::Role, normalize_arguments,
    AssistantTurn, Conversation, Message, ModelSettings, ProviderAdapter, ProviderResult,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// The Anthropic API base URL.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";

/// The Anthropic API version.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic (Claude) adapter.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<Value>,
}

impl AnthropicAdapter {
    /// Create a new adapter; `base_url` overrides the public endpoint.
    pub fn new(api_key: &str, base_url: Option<&str>) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|_| ProviderError::InvalidApiKey("anthropic".into()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        Ok(Self {
            client: http::client(headers)?,
            base_url: base_url
                .unwrap_or(ANTHROPIC_API_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Encode a conversation as an Anthropic request body.
///
/// Consecutive tool messages are folded into one user message, since the
/// API wants every result for an assistant turn in the next user turn.
pub fn build_request(
    conversation: &Conversation,
    tools: &[ToolDefinition],
    settings: &ModelSettings,
) -> ProviderResult<Value> {
    ensure_linked(conversation)?;

    let mut messages: Vec<AnthropicMessage> = Vec::new();
    for msg in conversation.messages() {
        match msg.role {
            Role::User => messages.push(AnthropicMessage {
                role: "user",
                content: vec![json!({ "type": "text", "text": msg.content })],
            }),
            Role::Assistant => messages.push(AnthropicMessage {
                role: "assistant",
                content: assistant_blocks(msg),
            }),
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.content,
                    "is_error": msg.is_error,
                });
                match messages.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last.content.iter().all(|b| b["type"] == "tool_result") =>
                    {
                        last.content.push(block)
                    }
                    _ => messages.push(AnthropicMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let request = AnthropicRequest {
        model: settings.model_id().to_string(),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        system: settings.system_prompt.clone(),
        messages,
        tools: tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect(),
    };

    Ok(serde_json::to_value(request)?)
}

fn assistant_blocks(msg: &Message) -> Vec<Value> {
    let mut blocks = Vec::new();
    if !msg.content.is_empty() {
        blocks.push(json!({ "type": "text", "text": msg.content }));
    }
    for call in &msg.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.arguments,
        }));
    }
    if blocks.is_empty() {
        blocks.push(json!({ "type": "text", "text": "" }));
    }
    blocks
}

/// Decode an Anthropic response body.
pub fn parse_response(body: &Value) -> ProviderResult<AssistantTurn> {
    let content = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::invalid_response("response has no content array"))?;

    let mut text = String::new();
    let mut calls = Vec::new();
    for block in content {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str);
                let name = block.get("name").and_then(Value::as_str);
                let (Some(id), Some(name)) = (id, name) else {
                    return Err(ProviderError::invalid_response(
                        "tool_use block without id or name",
                    ));
                };
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                calls.push(ToolCall::new(id, name, normalize_arguments(input)));
            }
            other => debug!(block_type = ?other, "Skipping Anthropic content block"),
        }
    }

    Ok(AssistantTurn::from_parts(text, calls))
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
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
            "Sending Anthropic API request"
        );

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url));
        let response = http::post_json(request, &body, self.provider_id()).await?;
        parse_response(&response)
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }
}
