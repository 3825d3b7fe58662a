//! Scripted provider for agent loop tests.
//!
//! Turns are returned in the order they were queued. Once the queue is
//! empty the repeating turn is returned, if one is set; otherwise the call
//! fails with an internal error so a test that under-scripts is loud.

use amaya_provider::{
    AssistantTurn, Conversation, ModelSettings, ProviderAdapter, ProviderError, ProviderResult,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded call to [`ScriptedProvider::send`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The conversation as it was when the call was made.
    pub conversation: Conversation,
    /// Names of the tools offered to the model.
    pub tools: Vec<String>,
    /// The model id requested.
    pub model: String,
}

/// A provider that replays queued turns.
///
/// # Example
///
/// ```rust,ignore
/// use amaya_test_utils::ScriptedProvider;
///
/// let provider = ScriptedProvider::new()
///     .then_tool_call("c1", "list_files", json!({"path": "."}))
///     .then_answer("Done");
///
/// // Run the loop...
///
/// assert_eq!(provider.call_count(), 2);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    queue: Arc<Mutex<VecDeque<ProviderResult<AssistantTurn>>>>,
    repeating: Arc<Mutex<Option<AssistantTurn>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Create a provider with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue any turn.
    pub fn then(self, turn: AssistantTurn) -> Self {
        self.queue.lock().unwrap().push_back(Ok(turn));
        self
    }

    /// Queue a final answer.
    pub fn then_answer(self, text: impl Into<String>) -> Self {
        self.then(AssistantTurn::FinalAnswer(text.into()))
    }

    /// Queue a turn with a single tool call and no text.
    pub fn then_tool_call(self, id: &str, name: &str, arguments: Value) -> Self {
        self.then_tool_calls(vec![ToolCall::new(id, name, arguments)])
    }

    /// Queue a turn with several tool calls and no text.
    pub fn then_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.then(AssistantTurn::ToolRequests {
            text: String::new(),
            calls,
        })
    }

    /// Queue a failure.
    pub fn then_error(self, error: ProviderError) -> Self {
        self.queue.lock().unwrap().push_back(Err(error));
        self
    }

    /// Return `turn` forever once the queue is exhausted.
    pub fn repeating(self, turn: AssistantTurn) -> Self {
        *self.repeating.lock().unwrap() = Some(turn);
        self
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Get the last call made.
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Number of scripted turns not yet consumed.
    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        settings: &ModelSettings,
    ) -> ProviderResult<AssistantTurn> {
        self.calls.lock().unwrap().push(RecordedCall {
            conversation: conversation.clone(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
            model: settings.model_id().to_string(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => self
                .repeating
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ProviderError::internal("script exhausted")),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amaya_provider::Message;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order_then_repeats() {
        let provider = ScriptedProvider::new()
            .then_tool_call("c1", "read_file", json!({"path": "a"}))
            .then_answer("done")
            .repeating(AssistantTurn::FinalAnswer("again".into()));
        let conversation = Conversation::from_user("hi");
        let settings = ModelSettings::default();

        let first = provider.send(&conversation, &[], &settings).await.unwrap();
        assert!(matches!(first, AssistantTurn::ToolRequests { ref calls, .. } if calls[0].id == "c1"));
        assert_eq!(
            provider.send(&conversation, &[], &settings).await.unwrap(),
            AssistantTurn::FinalAnswer("done".into())
        );
        assert_eq!(
            provider.send(&conversation, &[], &settings).await.unwrap(),
            AssistantTurn::FinalAnswer("again".into())
        );
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_records_calls_and_errors_when_exhausted() {
        let provider = ScriptedProvider::new().then_error(ProviderError::api_error(503, "busy"));
        let mut conversation = Conversation::from_user("hi");
        conversation.push(Message::assistant("hello"));
        let tools = vec![ToolDefinition {
            name: "list_files".into(),
            description: String::new(),
            parameters: json!({"type": "object"}),
        }];
        let settings = ModelSettings::default();

        assert!(provider.send(&conversation, &tools, &settings).await.is_err());
        let err = provider.send(&conversation, &tools, &settings).await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));

        let last = provider.last_call().unwrap();
        assert_eq!(last.tools, vec!["list_files"]);
        assert_eq!(last.conversation.len(), 2);
        assert_eq!(last.model, settings.model_id());
    }
}
