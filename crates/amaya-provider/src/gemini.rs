//! Google Gemini `generateContent` adapter.

use crate::{
    ensure_linked, error::ProviderError, http, message::Role, normalize_arguments,
    AssistantTurn, Conversation, ModelSettings, ProviderAdapter, ProviderResult, ToolCall,
    ToolDefinition,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::info;

/// The Gemini API base URL.
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Schema keywords the function declaration format rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "additionalProperties", "default"];

/// Google Gemini adapter.
pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(api_key: &str, base_url: Option<&str>) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|_| ProviderError::InvalidApiKey("gemini".into()))?,
        );

        Ok(Self {
            client: http::client(headers)?,
            base_url: base_url
                .unwrap_or(GEMINI_API_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Encode a conversation as a `generateContent` request body.
///
/// Function responses carry the function name rather than the call id
/// alone, so names are looked up from the assistant message they answer.
pub fn build_request(
    conversation: &Conversation,
    tools: &[ToolDefinition],
    settings: &ModelSettings,
) -> ProviderResult<Value> {
    ensure_linked(conversation)?;

    let mut contents: Vec<Value> = Vec::new();
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut responses: Vec<Value> = Vec::new();

    for msg in conversation.messages() {
        if msg.role != Role::Tool && !responses.is_empty() {
            contents.push(json!({ "role": "user", "parts": std::mem::take(&mut responses) }));
        }

        match msg.role {
            Role::User => contents.push(json!({
                "role": "user",
                "parts": [{ "text": msg.content }],
            })),
            Role::Assistant => {
                call_names = msg
                    .tool_calls
                    .iter()
                    .map(|c| (c.id.as_str(), c.name.as_str()))
                    .collect();

                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(json!({ "text": msg.content }));
                }
                for call in &msg.tool_calls {
                    parts.push(json!({
                        "functionCall": { "id": call.id, "name": call.name, "args": call.arguments }
                    }));
                }
                if parts.is_empty() {
                    parts.push(json!({ "text": "" }));
                }
                contents.push(json!({ "role": "model", "parts": parts }));
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().unwrap_or_default();
                let name = call_names.get(id).ok_or_else(|| {
                    ProviderError::protocol(format!("no call '{}' to answer", id))
                })?;
                let response = if msg.is_error {
                    json!({ "error": msg.content })
                } else {
                    json!({ "content": msg.content })
                };
                responses.push(json!({
                    "functionResponse": { "id": id, "name": name, "response": response }
                }));
            }
        }
    }
    if !responses.is_empty() {
        contents.push(json!({ "role": "user", "parts": responses }));
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": settings.max_tokens,
            "temperature": settings.temperature,
        }
    });
    if let Some(system) = &settings.system_prompt {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    if !tools.is_empty() {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": sanitize_schema(&t.parameters),
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    Ok(body)
}

/// Strip schema keywords Gemini does not accept, recursively.
fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), sanitize_schema(v)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

/// Decode a `generateContent` response body.
///
/// Calls without an `id` get `call_<n>`, unique within the turn, including
/// against ids the response did supply.
pub fn parse_response(body: &Value) -> ProviderResult<AssistantTurn> {
    let candidate = body.pointer("/candidates/0").ok_or_else(|| {
        let reason = body
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .unwrap_or("no candidates");
        ProviderError::invalid_response(format!("response has no candidates: {}", reason))
    })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut text = String::new();
    let mut calls: Vec<ToolCall> = Vec::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::invalid_response("functionCall without name"))?;
            // Missing ids are minted by `AssistantTurn::from_parts`.
            let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
            let args = call.get("args").cloned().unwrap_or(Value::Null);
            calls.push(ToolCall::new(id, name, normalize_arguments(args)));
        }
    }

    if text.is_empty() && calls.is_empty() {
        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            if reason != "STOP" {
                return Err(ProviderError::invalid_response(format!(
                    "empty candidate, finish reason {}",
                    reason
                )));
            }
        }
    }

    Ok(AssistantTurn::from_parts(text, calls))
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
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
            "Sending Gemini API request"
        );

        let request = self.client.post(format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            settings.model_id()
        ));
        let response = http::post_json(request, &body, self.provider_id()).await?;
        parse_response(&response)
    }

    fn provider_id(&self) -> &str {
        "gemini"
    }
}
