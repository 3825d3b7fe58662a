//! Runtime assembly.
//!
//! A [`Runtime`] owns everything one agent session needs: the tool
//! registry snapshot, the dispatcher, the sub-agent spawner and the MCP
//! bridge. Build one per session; nothing here is global.

use crate::agent::{AgentLoop, RunSummary};
use crate::config::AgentSettings;
use crate::error::AgentResult;
use crate::event::AgentEvent;
use crate::subagent::SubagentSpawner;
use amaya_mcp::McpBridge;
use amaya_provider::{Conversation, Message, ProviderAdapter};
use amaya_storage::ConversationStore;
use amaya_tools::subagent::InvokeSubagentsTool;
use amaya_tools::{
    Builtins, Capability, FileIndex, ReminderScheduler, ToolDispatcher, ToolEvent, ToolRegistry,
    WorkspaceIndex,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configures and builds a [`Runtime`].
pub struct RuntimeBuilder {
    provider: Arc<dyn ProviderAdapter>,
    settings: Arc<AgentSettings>,
    index: Option<Arc<dyn FileIndex>>,
    scheduler: Option<Arc<dyn ReminderScheduler>>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
    bridge: Option<Arc<McpBridge>>,
}

impl RuntimeBuilder {
    /// Use a custom file index for `find_files`.
    pub fn with_index(mut self, index: Arc<dyn FileIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Offer `create_reminder`, backed by `scheduler`.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn ReminderScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Use an existing bridge. Configured servers are added to it.
    pub fn with_bridge(mut self, bridge: Arc<McpBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Register tools, connect MCP servers and wire the dispatcher.
    ///
    /// An MCP server that cannot be reached is logged and skipped; its
    /// tools are simply absent.
    pub async fn build(self) -> AgentResult<Runtime> {
        let settings = self.settings;
        settings.validate()?;

        let index = self.index.unwrap_or_else(|| Arc::new(WorkspaceIndex));
        let mut builtins = Builtins::new(index);
        builtins.shell_timeout_ms = settings.shell_timeout_ms;
        builtins.shell_max_timeout_ms = settings.shell_max_timeout_ms;
        if let Some(scheduler) = self.scheduler {
            builtins = builtins.with_scheduler(scheduler);
        }
        if let Some(dir) = &settings.memory_dir {
            builtins = builtins.with_memory_dir(dir);
        }
        let mut registry = ToolRegistry::with_builtins(&builtins);

        let mut spawner = SubagentSpawner::new(self.provider.clone(), settings.clone());
        if let Some(tx) = &self.events {
            spawner = spawner.with_events(tx.clone());
        }
        let spawner = Arc::new(spawner);
        if settings.has_capability(Capability::Delegate) && settings.max_recursion_depth > 0 {
            registry.register_tool(Arc::new(InvokeSubagentsTool::new(
                spawner.clone(),
                settings.max_subagents,
                settings.subagent_stagger(),
            )))?;
        }

        let bridge = self.bridge.unwrap_or_else(|| Arc::new(McpBridge::new()));
        for (name, config) in &settings.mcp_servers {
            if let Err(e) = bridge.add_server(name, config).await {
                warn!(server = %name, error = %e, "Failed to add MCP server");
            }
        }
        let remote = amaya_tools::mcp::merge_discovered(&mut registry, &bridge).await;
        for shadowed in registry.shadowed() {
            info!(
                tool = %shadowed.name,
                server = %shadowed.server,
                "MCP tool shadowed by a local tool"
            );
        }

        let registry = Arc::new(registry);
        let mut dispatcher = ToolDispatcher::new(registry.clone(), Arc::new(settings.guard()))
            .with_capabilities(settings.capabilities.iter().copied());
        if let Some(tx) = &self.events {
            dispatcher = dispatcher.with_events(forward_tool_events(tx.clone()));
        }
        let dispatcher = Arc::new(dispatcher);
        spawner.bind(&dispatcher);

        debug!(
            tools = registry.len(),
            remote,
            granted = dispatcher.granted().len(),
            "Runtime ready"
        );

        Ok(Runtime {
            provider: self.provider,
            settings,
            registry,
            dispatcher,
            bridge,
            events: self.events,
        })
    }
}

fn forward_tool_events(
    tx: mpsc::UnboundedSender<AgentEvent>,
) -> mpsc::UnboundedSender<ToolEvent> {
    let (tool_tx, mut tool_rx) = mpsc::unbounded_channel::<ToolEvent>();
    tokio::spawn(async move {
        while let Some(event) = tool_rx.recv().await {
            if tx.send(event.into()).is_err() {
                break;
            }
        }
    });
    tool_tx
}

/// A fully wired agent session.
pub struct Runtime {
    provider: Arc<dyn ProviderAdapter>,
    settings: Arc<AgentSettings>,
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    bridge: Arc<McpBridge>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl Runtime {
    pub fn builder(
        provider: Arc<dyn ProviderAdapter>,
        settings: Arc<AgentSettings>,
    ) -> RuntimeBuilder {
        RuntimeBuilder {
            provider,
            settings,
            index: None,
            scheduler: None,
            events: None,
            bridge: None,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn bridge(&self) -> &Arc<McpBridge> {
        &self.bridge
    }

    pub fn settings(&self) -> &Arc<AgentSettings> {
        &self.settings
    }

    /// A top-level loop over this runtime's tools.
    ///
    /// Each loop gets its own run state, such as the todo list; only the
    /// registry and settings are shared.
    pub fn agent_loop(&self) -> AgentLoop {
        let agent = AgentLoop::new(
            self.provider.clone(),
            Arc::new(self.dispatcher.for_run()),
            self.settings.clone(),
        );
        match &self.events {
            Some(tx) => agent.with_events(tx.clone()),
            None => agent,
        }
    }

    /// Run `conversation` to a final answer.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> AgentResult<RunSummary> {
        self.agent_loop().run(conversation, cancel).await
    }

    /// Run one user turn against a stored conversation.
    ///
    /// Starts a new conversation when `conversation_id` is `None`. Every
    /// message the turn produced is persisted, including those of a failed
    /// or cancelled run. Returns the conversation id with the summary.
    pub async fn run_turn(
        &self,
        store: &dyn ConversationStore,
        conversation_id: Option<&str>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<(String, RunSummary)> {
        let id = match conversation_id {
            Some(id) => id.to_string(),
            None => store.create(Some(&title_for(prompt))).await?,
        };
        let mut conversation = store.load(&id).await?;
        let start = conversation.len();
        conversation.push(Message::user(prompt));

        let result = self.run(&mut conversation, cancel).await;

        for message in conversation.since(start) {
            if let Err(e) = store.append(&id, message).await {
                warn!(conversation = %id, error = %e, "Failed to persist message");
                // A run error is more useful to the caller than the
                // storage error it caused.
                result?;
                return Err(e.into());
            }
        }
        result.map(|summary| (id, summary))
    }

    /// Close MCP connections.
    pub async fn shutdown(&self) {
        self.bridge.close_all().await;
    }
}

fn title_for(prompt: &str) -> String {
    const MAX: usize = 50;
    let line = prompt.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use amaya_mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
    use amaya_mcp::{McpResult, Transport};
    use amaya_provider::{ProviderError, Role};
    use amaya_storage::{
        ConversationSummary, MemoryConversationStore, StorageError, StorageResult,
    };
    use amaya_test_utils::{BuiltTestProject, ScriptedProvider, TestProject};
    use amaya_tools::subagent::INVOKE_SUBAGENTS;
    use amaya_tools::ToolOrigin;
    use async_trait::async_trait;
    use serde_json::json;

    /// Loads an empty conversation and refuses every write.
    struct ReadOnlyStore;

    #[async_trait]
    impl ConversationStore for ReadOnlyStore {
        async fn create(&self, _title: Option<&str>) -> StorageResult<String> {
            Ok("c1".into())
        }

        async fn load(&self, id: &str) -> StorageResult<Conversation> {
            match id {
                "c1" => Ok(Conversation::new()),
                other => Err(StorageError::not_found(other)),
            }
        }

        async fn append(&self, _id: &str, _message: &Message) -> StorageResult<()> {
            Err(StorageError::LockPoisoned("read-only".into()))
        }

        async fn list(&self) -> StorageResult<Vec<ConversationSummary>> {
            Ok(Vec::new())
        }

        async fn remove(&self, _id: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    struct SearchServer;

    #[async_trait]
    impl Transport for SearchServer {
        async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
            let id = request.id;
            Ok(match request.method.as_str() {
                "initialize" => JsonRpcResponse::success(
                    id,
                    json!({"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}}),
                ),
                "tools/list" => JsonRpcResponse::success(
                    id,
                    json!({"tools": [
                        {"name": "web_search", "description": "Search the web",
                         "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}},
                        {"name": "write_file", "description": "Remote write"}
                    ]}),
                ),
                "tools/call" => JsonRpcResponse::success(
                    id,
                    json!({"content": [{"type": "text", "text": "3 results"}]}),
                ),
                other => JsonRpcResponse::failure(id, -32601, format!("no method {other}")),
            })
        }

        async fn notify(&self, _notification: JsonRpcNotification) -> McpResult<()> {
            Ok(())
        }

        async fn close(&self) -> McpResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn project() -> BuiltTestProject {
        TestProject::new().with_file("a.txt", "A").build()
    }

    async fn runtime(
        provider: &ScriptedProvider,
        settings: AgentSettings,
    ) -> Runtime {
        Runtime::builder(Arc::new(provider.clone()), Arc::new(settings))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_builtins_and_subagent_tool() {
        let project = project();
        let provider = ScriptedProvider::new();
        let rt = runtime(&provider, AgentSettings::for_root(project.path())).await;

        for name in ["read_file", "write_file", "run_shell", "update_todo", INVOKE_SUBAGENTS] {
            assert!(rt.registry().contains(name), "missing {name}");
        }
        assert!(!rt.registry().contains("create_reminder"));
        assert!(!rt.registry().contains("update_memory"));
    }

    #[tokio::test]
    async fn test_no_subagent_tool_without_delegation() {
        let project = project();
        let provider = ScriptedProvider::new();

        let mut settings = AgentSettings::for_root(project.path());
        settings.max_recursion_depth = 0;
        let rt = runtime(&provider, settings).await;
        assert!(!rt.registry().contains(INVOKE_SUBAGENTS));

        let mut settings = AgentSettings::for_root(project.path());
        settings.capabilities.retain(|c| *c != Capability::Delegate);
        let rt = runtime(&provider, settings).await;
        assert!(!rt.registry().contains(INVOKE_SUBAGENTS));
    }

    #[tokio::test]
    async fn test_memory_dir_enables_memory_tool() {
        let project = project();
        let provider = ScriptedProvider::new();
        let mut settings = AgentSettings::for_root(project.path());
        settings.memory_dir = Some(project.path().join(".amaya/memory"));

        let rt = runtime(&provider, settings).await;
        assert!(rt.registry().contains("update_memory"));
    }

    #[tokio::test]
    async fn test_mcp_tools_are_merged_behind_local_ones() {
        let project = project();
        let provider = ScriptedProvider::new()
            .then_tool_call("m1", "web_search", json!({"q": "amaya"}))
            .then_answer("found 3");
        let bridge = Arc::new(McpBridge::new());
        bridge
            .connect_with("search", "memory://search", Arc::new(SearchServer))
            .await;

        let rt = Runtime::builder(
            Arc::new(provider.clone()),
            Arc::new(AgentSettings::for_root(project.path())),
        )
        .with_bridge(bridge)
        .build()
        .await
        .unwrap();

        assert_eq!(
            rt.registry().resolve("web_search").unwrap().origin,
            ToolOrigin::Mcp("search".to_string())
        );
        assert!(rt.registry().resolve("write_file").unwrap().is_local());

        let mut conversation = Conversation::from_user("search for amaya");
        rt.run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(conversation.messages()[2].content, "3 results");
        rt.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_settings_fail_build() {
        let project = project();
        let mut settings = AgentSettings::for_root(project.path());
        settings.max_loop_iterations = 0;

        let result = Runtime::builder(Arc::new(ScriptedProvider::new()), Arc::new(settings))
            .build()
            .await;
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_turn_persists_conversation() {
        let project = project();
        let provider = ScriptedProvider::new()
            .then_tool_call("r", "read_file", json!({"path": "a.txt"}))
            .then_answer("It contains A")
            .then_answer("Still A");
        let rt = runtime(&provider, AgentSettings::for_root(project.path())).await;
        let store = MemoryConversationStore::new();
        let cancel = CancellationToken::new();

        let (id, summary) = rt
            .run_turn(&store, None, "What is in a.txt?", &cancel)
            .await
            .unwrap();
        assert_eq!(summary.answer, "It contains A");
        assert_eq!(store.load(&id).await.unwrap().len(), 4);

        let (same, _) = rt
            .run_turn(&store, Some(&id), "And now?", &cancel)
            .await
            .unwrap();
        assert_eq!(same, id);
        let stored = store.load(&id).await.unwrap();
        assert_eq!(stored.len(), 6);
        assert_eq!(stored.messages()[4].role, Role::User);
        // The second request carried the whole history.
        assert_eq!(provider.last_call().unwrap().conversation.len(), 5);
    }

    #[tokio::test]
    async fn test_run_turn_persists_partial_run() {
        let project = project();
        let provider = ScriptedProvider::new()
            .then_tool_call("r", "read_file", json!({"path": "a.txt"}))
            .then_error(ProviderError::InvalidApiKey("scripted".into()));
        let rt = runtime(&provider, AgentSettings::for_root(project.path())).await;
        let store = MemoryConversationStore::new();

        let err = rt
            .run_turn(&store, None, "read a.txt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 1);
        let stored = store.load(&summaries[0].id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.check_tool_links().is_ok());
    }

    #[tokio::test]
    async fn test_run_turn_surfaces_storage_failure() {
        let project = project();
        let provider = ScriptedProvider::new().then_answer("hello");
        let rt = runtime(&provider, AgentSettings::for_root(project.path())).await;

        let err = rt
            .run_turn(&ReadOnlyStore, Some("c1"), "hi", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Storage(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_turn_unknown_conversation() {
        let project = project();
        let provider = ScriptedProvider::new().then_answer("unused");
        let rt = runtime(&provider, AgentSettings::for_root(project.path())).await;

        let err = rt
            .run_turn(&ReadOnlyStore, Some("missing"), "hi", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Storage(StorageError::NotFound(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_todo_events_are_forwarded() {
        let project = project();
        let provider = ScriptedProvider::new()
            .then_tool_call(
                "t",
                "update_todo",
                json!({"todos": [{"id": "1", "content": "write tests", "status": "in_progress"}]}),
            )
            .then_answer("planned");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let rt = Runtime::builder(
            Arc::new(provider.clone()),
            Arc::new(AgentSettings::for_root(project.path())),
        )
        .with_events(tx)
        .build()
        .await
        .unwrap();

        let mut conversation = Conversation::from_user("plan");
        rt.run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap();

        let todos = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if let Some(AgentEvent::TodosUpdated(items)) = rx.recv().await {
                    return items;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].content.as_deref(), Some("write tests"));
    }

    #[tokio::test]
    async fn test_runs_do_not_share_todo_lists() {
        let project = project();
        let provider = ScriptedProvider::new()
            .then_tool_call(
                "a",
                "update_todo",
                json!({"todos": [{"id": 1, "content": "first run task"}]}),
            )
            .then_answer("first done")
            .then_tool_call(
                "b",
                "update_todo",
                json!({"todos": [{"id": 2, "status": "done", "content": "second run"}]}),
            )
            .then_answer("second done");
        let rt = runtime(&provider, AgentSettings::for_root(project.path())).await;
        let cancel = CancellationToken::new();

        let mut first = Conversation::from_user("one");
        rt.run(&mut first, &cancel).await.unwrap();
        let mut second = Conversation::from_user("two");
        rt.run(&mut second, &cancel).await.unwrap();

        let result = &second.messages()[2];
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.content, "Todo updated: 1/1 completed\n[x] 2. second run");
    }

    #[test]
    fn test_title_for() {
        assert_eq!(title_for("  fix the build\nplease"), "fix the build");
        let long = "x".repeat(80);
        assert_eq!(title_for(&long), format!("{}...", "x".repeat(50)));
    }
}
