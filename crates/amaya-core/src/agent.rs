//! The agent loop.
//!
//! One run drives a conversation until the model gives a final answer:
//!
//! ```text
//! AwaitingModel --FinalAnswer--> Completed
//!      |  ^
//! ToolRequests  results appended
//!      v  |
//!   Dispatching
//! ```
//!
//! Tool failures never end a run. Only provider failures (after retries),
//! the iteration limit and cancellation do, and those are returned to the
//! caller as an [`AgentError`].

use crate::config::AgentSettings;
use crate::error::{AgentError, AgentResult};
use crate::event::AgentEvent;
use crate::retry::{sleep_with_cancel, RetryHelper};
use amaya_provider::{AssistantTurn, Conversation, Message, ProviderAdapter, ToolDefinition};
use amaya_tools::ToolDispatcher;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// The model's final text.
    pub answer: String,
    /// Model calls made.
    pub iterations: u32,
    /// Tool calls dispatched.
    pub tool_calls: usize,
}

/// Runs the request/dispatch cycle for one conversation turn.
pub struct AgentLoop {
    provider: Arc<dyn ProviderAdapter>,
    dispatcher: Arc<ToolDispatcher>,
    settings: Arc<AgentSettings>,
    max_iterations: u32,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl AgentLoop {
    /// Create a loop bounded by `settings.max_loop_iterations`.
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        dispatcher: Arc<ToolDispatcher>,
        settings: Arc<AgentSettings>,
    ) -> Self {
        let max_iterations = settings.max_loop_iterations;
        Self {
            provider,
            dispatcher,
            settings,
            max_iterations,
            events: None,
        }
    }

    /// Override the iteration bound.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Send progress events to a listener.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn depth(&self) -> u32 {
        self.dispatcher.depth()
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run until a final answer, appending every message to `conversation`.
    ///
    /// On failure the conversation ends at the last fully appended message.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> AgentResult<RunSummary> {
        let depth = self.depth();
        let span = info_span!("agent_loop", depth);
        let result = self.run_inner(conversation, cancel).instrument(span).await;

        match &result {
            Ok(summary) => {
                info!(
                    depth,
                    iterations = summary.iterations,
                    tool_calls = summary.tool_calls,
                    "Agent run completed"
                );
                self.emit(AgentEvent::Completed {
                    depth,
                    iterations: summary.iterations,
                });
            }
            Err(e) => {
                warn!(depth, error = %e, "Agent run failed");
                self.emit(AgentEvent::Failed {
                    depth,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_inner(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> AgentResult<RunSummary> {
        let depth = self.depth();
        let definitions = self.dispatcher.definitions();
        let mut iterations = 0u32;
        let mut tool_calls = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if iterations >= self.max_iterations {
                return Err(AgentError::IterationLimitExceeded {
                    limit: self.max_iterations,
                });
            }

            iterations += 1;
            debug!(iteration = iterations, messages = conversation.len(), "Requesting model turn");
            self.emit(AgentEvent::ModelRequest {
                depth,
                iteration: iterations,
            });

            let turn = self.request(conversation, &definitions, cancel).await?;
            let (text, calls) = match turn {
                AssistantTurn::FinalAnswer(answer) => {
                    conversation.push(Message::assistant(answer.clone()));
                    return Ok(RunSummary {
                        answer,
                        iterations,
                        tool_calls,
                    });
                }
                AssistantTurn::ToolRequests { text, calls } => (text, calls),
            };

            conversation.push(Message::assistant_with_calls(text.clone(), calls.clone()));
            if !text.trim().is_empty() {
                self.emit(AgentEvent::AssistantText { depth, text });
            }

            debug!(iteration = iterations, count = calls.len(), "Dispatching tool calls");
            for call in &calls {
                self.emit(AgentEvent::ToolStarted {
                    depth,
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                });
            }

            // Handlers watch child tokens of `cancel`, so this returns
            // promptly once the run is cancelled.
            let results = self.dispatcher.execute_all(&calls, cancel).await;
            tool_calls += calls.len();

            for (call, result) in calls.iter().zip(&results) {
                self.emit(AgentEvent::ToolFinished {
                    depth,
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    is_error: result.is_error(),
                });
                conversation.push(result.to_message());
            }

            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
        }
    }

    /// One model request, with retries for transport failures.
    async fn request(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> AgentResult<AssistantTurn> {
        let mut retry = RetryHelper::new(&self.settings.retry);

        loop {
            let send = self.provider.send(conversation, tools, &self.settings.model);
            let result = tokio::select! {
                result = send => result,
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            };

            let error = match result {
                Ok(turn) => return Ok(turn),
                Err(e) => e,
            };

            let Some(delay) = retry.next_delay(&error) else {
                return Err(AgentError::Provider(error));
            };
            warn!(
                provider = self.provider.provider_id(),
                attempt = retry.current_attempt(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Provider request failed, retrying"
            );
            self.emit(AgentEvent::Retrying {
                depth: self.depth(),
                attempt: retry.current_attempt(),
                delay,
                error: error.to_string(),
            });
            if !sleep_with_cancel(delay, cancel).await {
                return Err(AgentError::Cancelled);
            }
        }
    }
}
