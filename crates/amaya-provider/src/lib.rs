//! LLM provider abstraction for amaya.
//!
//! The agent loop talks to a model through one capability,
//! [`ProviderAdapter`], implemented for three wire formats:
//! - Anthropic messages API
//! - OpenAI chat completions
//! - Google Gemini `generateContent`
//!
//! Each adapter owns the translation of the neutral [`Conversation`] and
//! [`ToolDefinition`]s into vendor JSON and of the vendor response back
//! into an [`AssistantTurn`]. The translation functions are pure so they
//! can be tested without a network.

pub mod error;
pub mod message;
pub mod settings;

pub mod anthropic;
pub mod gemini;
pub mod openai;

mod http;

pub use error::{ProviderError, ProviderResult};
pub use message::{
    ensure_unique_call_ids, normalize_arguments, Conversation, LinkError, Message, Role, ToolCall,
};
pub use settings::{ModelSettings, ProviderKind};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for parameters.
    pub parameters: Value,
}

/// What the model answered.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantTurn {
    /// Plain text; the turn is over.
    FinalAnswer(String),
    /// One or more tool calls, possibly with accompanying text.
    ToolRequests { text: String, calls: Vec<ToolCall> },
}

impl AssistantTurn {
    /// Build a turn from decoded text and calls.
    ///
    /// Blank or repeated call ids are replaced so every call in the turn
    /// can be answered unambiguously.
    pub fn from_parts(text: String, mut calls: Vec<ToolCall>) -> Self {
        let replaced = message::ensure_unique_call_ids(&mut calls);
        if replaced > 0 {
            tracing::debug!(replaced, "Replaced blank or repeated tool call ids");
        }
        if calls.is_empty() {
            AssistantTurn::FinalAnswer(text)
        } else {
            AssistantTurn::ToolRequests { text, calls }
        }
    }

    /// The assistant message to append to the conversation.
    pub fn to_message(&self) -> Message {
        match self {
            AssistantTurn::FinalAnswer(text) => Message::assistant(text.clone()),
            AssistantTurn::ToolRequests { text, calls } => {
                Message::assistant_with_calls(text.clone(), calls.clone())
            }
        }
    }
}

/// A model endpoint the agent loop can send a conversation to.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Send the conversation and return the model's next turn.
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> ProviderResult<AssistantTurn>;

    /// Get the provider ID.
    fn provider_id(&self) -> &str;
}

/// The bundled adapters, selected by [`ProviderKind`].
pub enum Provider {
    Anthropic(anthropic::AnthropicAdapter),
    OpenAi(openai::OpenAiAdapter),
    Gemini(gemini::GeminiAdapter),
}

impl Provider {
    /// Build the adapter named by the settings.
    pub fn from_settings(settings: &ModelSettings) -> ProviderResult<Self> {
        let api_key = settings
            .resolved_api_key()
            .ok_or_else(|| ProviderError::MissingApiKey(settings.provider.to_string()))?;
        let base_url = settings.base_url.as_deref();

        Ok(match settings.provider {
            ProviderKind::Anthropic => {
                Provider::Anthropic(anthropic::AnthropicAdapter::new(&api_key, base_url)?)
            }
            ProviderKind::OpenAi => {
                Provider::OpenAi(openai::OpenAiAdapter::new(&api_key, base_url)?)
            }
            ProviderKind::Gemini => {
                Provider::Gemini(gemini::GeminiAdapter::new(&api_key, base_url)?)
            }
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Anthropic(_) => ProviderKind::Anthropic,
            Provider::OpenAi(_) => ProviderKind::OpenAi,
            Provider::Gemini(_) => ProviderKind::Gemini,
        }
    }
}

#[async_trait]
impl ProviderAdapter for Provider {
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> ProviderResult<AssistantTurn> {
        match self {
            Provider::Anthropic(p) => p.send(conversation, tools, settings).await,
            Provider::OpenAi(p) => p.send(conversation, tools, settings).await,
            Provider::Gemini(p) => p.send(conversation, tools, settings).await,
        }
    }

    fn provider_id(&self) -> &str {
        self.kind().as_str()
    }
}

/// Check the conversation before encoding it.
pub(crate) fn ensure_linked(conversation: &Conversation) -> ProviderResult<()> {
    conversation
        .check_tool_links()
        .map_err(|e| ProviderError::protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_from_parts() {
        assert_eq!(
            AssistantTurn::from_parts("hi".into(), vec![]),
            AssistantTurn::FinalAnswer("hi".into())
        );
        let call = ToolCall::new("c1", "list_files", json!({"path": "."}));
        let turn = AssistantTurn::from_parts("looking".into(), vec![call.clone()]);
        let msg = turn.to_message();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "looking");
        assert_eq!(msg.tool_calls, vec![call]);
    }

    #[test]
    fn test_from_settings_requires_key() {
        let settings = ModelSettings {
            api_key: String::new(),
            provider: ProviderKind::Gemini,
            ..ModelSettings::default()
        };
        // Only meaningful when the environment does not carry a key.
        if std::env::var("GEMINI_API_KEY").is_err() {
            assert!(matches!(
                Provider::from_settings(&settings),
                Err(ProviderError::MissingApiKey(_))
            ));
        }
    }

    #[test]
    fn test_from_settings_selects_variant() {
        for kind in ProviderKind::ALL {
            let settings = ModelSettings {
                api_key: "test-key".into(),
                ..ModelSettings::for_provider(kind)
            };
            let provider = Provider::from_settings(&settings).unwrap();
            assert_eq!(provider.kind(), kind);
            assert_eq!(provider.provider_id(), kind.as_str());
        }
    }
}
