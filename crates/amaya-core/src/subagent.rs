//! Nested agent loops for delegated tasks.
//!
//! The `invoke_subagents` tool lives in the parent dispatcher's registry,
//! and the spawner needs that dispatcher to build each child's registry.
//! The spawner is therefore built first and bound to the dispatcher once
//! both exist; it keeps only a weak handle so the two don't keep each
//! other alive.

use crate::agent::AgentLoop;
use crate::config::AgentSettings;
use crate::error::{AgentError, AgentResult};
use crate::event::AgentEvent;
use amaya_provider::{Conversation, ProviderAdapter};
use amaya_tools::{SubagentRunner, ToolDispatcher};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

/// Runs child agents with a restricted copy of the parent's tools.
pub struct SubagentSpawner {
    provider: Arc<dyn ProviderAdapter>,
    settings: Arc<AgentSettings>,
    parent: OnceLock<Weak<ToolDispatcher>>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl SubagentSpawner {
    pub fn new(provider: Arc<dyn ProviderAdapter>, settings: Arc<AgentSettings>) -> Self {
        Self {
            provider,
            settings,
            parent: OnceLock::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Attach the dispatcher whose tools children inherit.
    ///
    /// Only the first call has an effect.
    pub fn bind(&self, dispatcher: &Arc<ToolDispatcher>) {
        if self.parent.set(Arc::downgrade(dispatcher)).is_err() {
            debug!("Sub-agent spawner already bound");
        }
    }

    fn parent(&self) -> AgentResult<Arc<ToolDispatcher>> {
        self.parent
            .get()
            .ok_or_else(|| AgentError::SubagentUnavailable("spawner is not bound".into()))?
            .upgrade()
            .ok_or_else(|| AgentError::SubagentUnavailable("parent dispatcher dropped".into()))
    }

    /// Run `task` in a fresh conversation one level below `depth`.
    ///
    /// The child may use only `restricted` tools, minus `invoke_subagents`.
    /// Fails without calling the provider when `depth` is already at the
    /// recursion limit.
    pub async fn run(
        &self,
        task: &str,
        restricted: &[String],
        depth: u32,
        cancel: CancellationToken,
    ) -> AgentResult<String> {
        let limit = self.settings.max_recursion_depth;
        if depth >= limit {
            return Err(AgentError::RecursionLimitExceeded { depth, limit });
        }

        let parent = self.parent()?;
        let registry = parent.registry().restricted(restricted);
        debug!(depth = depth + 1, tools = registry.len(), "Starting sub-agent");

        // A fresh dispatcher also means a fresh todo list for the child.
        let mut dispatcher = ToolDispatcher::new(Arc::new(registry), parent.guard().clone())
            .with_capabilities(parent.granted().iter().copied())
            .with_depth(depth + 1);
        if let Some(tx) = parent.events() {
            dispatcher = dispatcher.with_events(tx.clone());
        }

        let mut agent = AgentLoop::new(
            self.provider.clone(),
            Arc::new(dispatcher),
            self.settings.clone(),
        )
        .with_max_iterations(self.settings.subagent_max_iterations);
        if let Some(tx) = &self.events {
            agent = agent.with_events(tx.clone());
        }

        let mut conversation = Conversation::from_user(task);
        let summary = agent
            .run(&mut conversation, &cancel)
            .instrument(info_span!("subagent", task = %task_label(task)))
            .await?;
        Ok(summary.answer)
    }
}

#[async_trait]
impl SubagentRunner for SubagentSpawner {
    async fn run_subagent(
        &self,
        task: &str,
        parent_depth: u32,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let tools = match self.parent() {
            Ok(parent) => parent.registry().local_names(),
            Err(e) => return Err(e.to_string()),
        };
        self.run(task, &tools, parent_depth, cancel)
            .await
            .map_err(|e| e.to_string())
    }
}

fn task_label(task: &str) -> String {
    const MAX: usize = 60;
    let line = task.lines().next().unwrap_or_default();
    match line.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}
