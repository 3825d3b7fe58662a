//! Tool dispatch.
//!
//! [`ToolDispatcher::execute`] never fails: an unknown name, a missing
//! capability, a schema violation, a guard refusal, a handler error and
//! even a handler panic all come back as a [`ToolResult`] error the model
//! can read and react to.

use crate::registry::ToolRegistry;
use crate::result::{ToolErrorKind, ToolResult};
use crate::{schema, Capability, TodoList, ToolContext, ToolError, ToolEvent};
use amaya_provider::{ToolCall, ToolDefinition};
use amaya_util::PathGuard;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executes tool calls against a read-only registry snapshot.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    guard: Arc<PathGuard>,
    granted: BTreeSet<Capability>,
    depth: u32,
    event_tx: Option<mpsc::UnboundedSender<ToolEvent>>,
    todos: TodoList,
}

impl ToolDispatcher {
    /// Create a dispatcher with the default capability grants.
    pub fn new(registry: Arc<ToolRegistry>, guard: Arc<PathGuard>) -> Self {
        Self {
            registry,
            guard,
            granted: Capability::default_grants().into_iter().collect(),
            depth: 0,
            event_tx: None,
            todos: TodoList::new(),
        }
    }

    /// A dispatcher over the same tools and grants with its own run state.
    pub fn for_run(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            guard: self.guard.clone(),
            granted: self.granted.clone(),
            depth: self.depth,
            event_tx: self.event_tx.clone(),
            todos: TodoList::new(),
        }
    }

    /// Replace the granted capability set.
    pub fn with_capabilities(mut self, granted: impl IntoIterator<Item = Capability>) -> Self {
        self.granted = granted.into_iter().collect();
        self
    }

    /// Set the sub-agent depth handed to tools.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Forward tool events to a listener.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ToolEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn guard(&self) -> &Arc<PathGuard> {
        &self.guard
    }

    pub fn granted(&self) -> &BTreeSet<Capability> {
        &self.granted
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn events(&self) -> Option<&mpsc::UnboundedSender<ToolEvent>> {
        self.event_tx.as_ref()
    }

    /// The task list of the run this dispatcher serves.
    pub fn todos(&self) -> &TodoList {
        &self.todos
    }

    /// Declarations of the tools this dispatcher may run.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .descriptors()
            .filter(|d| self.granted.contains(&d.capability))
            .map(|d| d.definition())
            .collect()
    }

    fn context(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolContext {
        ToolContext {
            call_id: call.id.clone(),
            root_dir: self
                .guard
                .primary_root()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            guard: self.guard.clone(),
            abort: cancel.child_token(),
            depth: self.depth,
            event_tx: self.event_tx.clone(),
            todos: self.todos.clone(),
        }
    }

    /// Execute one tool call.
    pub async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        let descriptor = match self.registry.resolve(&call.name) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                info!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
                return ToolResult::error(&call.id, ToolErrorKind::UnknownTool, e.to_string());
            }
        };

        if !self.granted.contains(&descriptor.capability) {
            info!(
                tool = %call.name,
                capability = %descriptor.capability,
                "Tool denied: capability not granted"
            );
            return ToolResult::error(
                &call.id,
                ToolErrorKind::ValidationDenied,
                format!(
                    "Tool '{}' requires the '{}' capability, which is not granted",
                    call.name, descriptor.capability
                ),
            );
        }

        if let Err(e) = schema::validate(&descriptor.schema, &call.arguments) {
            debug!(tool = %call.name, error = %e, "Invalid tool arguments");
            return ToolResult::error(
                &call.id,
                ToolErrorKind::InvalidArguments,
                format!("Invalid arguments for {}: {}", call.name, e),
            );
        }

        let ctx = self.context(call, cancel);
        debug!(tool = %call.name, call_id = %call.id, depth = self.depth, "Executing tool");
        let started = Instant::now();

        let run = AssertUnwindSafe(descriptor.handler.execute(call.arguments.clone(), &ctx))
            .catch_unwind();
        let outcome = tokio::select! {
            result = run => result,
            _ = ctx.abort.cancelled() => Ok(Err(ToolError::Cancelled)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                debug!(tool = %call.name, call_id = %call.id, elapsed_ms, "Tool finished");
                ToolResult::ok(&call.id, output)
            }
            Ok(Err(e)) => {
                let kind = e.kind();
                match kind {
                    ToolErrorKind::ValidationDenied => {
                        info!(tool = %call.name, reason = %e, "Tool call denied")
                    }
                    ToolErrorKind::ExecutionFailed => {
                        warn!(tool = %call.name, call_id = %call.id, error = %e, elapsed_ms, "Tool failed")
                    }
                    _ => debug!(tool = %call.name, error = %e, "Tool rejected its arguments"),
                }
                ToolResult::error(&call.id, kind, e.to_string())
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                warn!(tool = %call.name, call_id = %call.id, panic = %detail, "Tool panicked");
                ToolResult::error(
                    &call.id,
                    ToolErrorKind::ExecutionFailed,
                    format!("Tool '{}' crashed: {}", call.name, detail),
                )
            }
        }
    }

    /// Execute the calls of one assistant message concurrently.
    ///
    /// Results come back in call order, whatever order they complete in.
    pub async fn execute_all(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute(call, cancel))).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::EchoTool;
    use crate::result::ToolOutcome;
    use crate::{BoxedTool, HandlerResult, Tool, ToolOutput};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Sleeps for `ms`, then reports `tag`.
    struct SleepTool;

    #[async_trait]
    impl Tool for SleepTool {
        fn id(&self) -> &str {
            "sleep"
        }

        fn description(&self) -> &str {
            "Sleep"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "required": ["ms", "tag"],
                "properties": {
                    "ms": { "type": "integer", "minimum": 0 },
                    "tag": { "type": "string" }
                }
            })
        }

        fn capability(&self) -> Capability {
            Capability::FilesystemRead
        }

        async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                _ = ctx.abort.cancelled() => return Err(ToolError::Cancelled),
            }
            Ok(ToolOutput::new("slept", args["tag"].as_str().unwrap_or_default()))
        }
    }

    /// Fails in the requested way.
    struct FaultyTool;

    #[async_trait]
    impl Tool for FaultyTool {
        fn id(&self) -> &str {
            "faulty"
        }

        fn description(&self) -> &str {
            "Fails"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": { "mode": { "type": "string" } } })
        }

        fn capability(&self) -> Capability {
            Capability::FilesystemRead
        }

        async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
            match args["mode"].as_str() {
                Some("panic") => panic!("handler blew up"),
                Some("deny") => Err(ctx.resolve_path("/etc/passwd").unwrap_err()),
                _ => Err(ToolError::execution_failed("disk on fire")),
            }
        }
    }

    fn dispatcher(root: &Path, tools: Vec<BoxedTool>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register_tool(tool).unwrap();
        }
        ToolDispatcher::new(
            Arc::new(registry),
            Arc::new(PathGuard::new(vec![root.to_path_buf()])),
        )
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    #[tokio::test]
    async fn test_success() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path(), vec![EchoTool::named("echo")]);
        let result = d
            .execute(&call("c1", "echo", json!({"text": "hi"})), &CancellationToken::new())
            .await;
        assert_eq!(result.tool_call_id, "c1");
        match result.outcome {
            ToolOutcome::Ok(out) => assert_eq!(out.output, r#"local:{"text":"hi"}"#),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path(), vec![]);
        let result = d
            .execute(&call("c1", "nope", json!({})), &CancellationToken::new())
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
        assert_eq!(result.to_message().content, "Error: Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_capability_not_granted() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path(), vec![EchoTool::named("echo")])
            .with_capabilities([Capability::ShellExec]);
        let result = d
            .execute(&call("c1", "echo", json!({})), &CancellationToken::new())
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ValidationDenied));
        assert!(d.definitions().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path(), vec![Arc::new(SleepTool)]);
        let cancel = CancellationToken::new();

        let result = d.execute(&call("c1", "sleep", json!({"ms": 1})), &cancel).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidArguments));
        assert!(result.to_message().content.contains("'tag'"));

        // Unparsable string arguments from a provider stay a string.
        let result = d
            .execute(&call("c2", "sleep", json!("{not json")), &cancel)
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn test_handler_failures_are_absorbed() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path(), vec![Arc::new(FaultyTool)]);
        let cancel = CancellationToken::new();

        let failed = d.execute(&call("c1", "faulty", json!({})), &cancel).await;
        assert_eq!(failed.error_kind(), Some(ToolErrorKind::ExecutionFailed));
        assert!(failed.to_message().content.contains("disk on fire"));

        let denied = d
            .execute(&call("c2", "faulty", json!({"mode": "deny"})), &cancel)
            .await;
        assert_eq!(denied.error_kind(), Some(ToolErrorKind::ValidationDenied));

        let panicked = d
            .execute(&call("c3", "faulty", json!({"mode": "panic"})), &cancel)
            .await;
        assert_eq!(panicked.error_kind(), Some(ToolErrorKind::ExecutionFailed));
        assert!(panicked.to_message().content.contains("handler blew up"));
    }

    #[tokio::test]
    async fn test_results_keep_call_order() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path(), vec![Arc::new(SleepTool)]);

        // Scrambled latencies so completion order differs from call order.
        let calls: Vec<ToolCall> = (0..12)
            .map(|i| {
                let ms = (i * 7 + 5) % 11 * 4;
                call(&format!("c{i}"), "sleep", json!({"ms": ms, "tag": format!("t{i}")}))
            })
            .collect();

        let results = d.execute_all(&calls, &CancellationToken::new()).await;
        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("c{i}")).collect();
        assert_eq!(ids, expected);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.to_message().content, format!("t{i}"));
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_calls() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path(), vec![Arc::new(SleepTool)]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = d
            .execute(
                &call("c1", "sleep", json!({"ms": 10_000, "tag": "late"})),
                &cancel,
            )
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.to_message().content, "Error: Cancelled");
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let d = dispatcher(dir.path(), vec![Arc::new(crate::todo::UpdateTodoTool::new())])
            .with_events(tx);

        let result = d
            .execute(
                &call(
                    "c1",
                    "update_todo",
                    json!({"todos": [{"id": "1", "status": "pending", "content": "write tests"}]}),
                ),
                &CancellationToken::new(),
            )
            .await;
        assert!(!result.is_error());
        assert!(matches!(rx.try_recv(), Ok(ToolEvent::TodosUpdated(todos)) if todos.len() == 1));
    }

    #[tokio::test]
    async fn test_each_run_gets_its_own_todo_list() {
        let dir = tempdir().unwrap();
        let base = dispatcher(dir.path(), vec![Arc::new(crate::todo::UpdateTodoTool::new())]);
        let first = base.for_run();
        let second = base.for_run();
        let cancel = CancellationToken::new();

        first
            .execute(
                &call("c1", "update_todo", json!({"todos": [{"id": 1, "content": "first"}]})),
                &cancel,
            )
            .await;
        let result = second
            .execute(
                &call("c1", "update_todo", json!({"todos": [{"id": 2, "status": "done"}]})),
                &cancel,
            )
            .await;

        assert!(result.to_message().content.starts_with("Todo updated: 1/1 completed"));
        assert_eq!(first.todos().items().len(), 1);
        assert_eq!(second.todos().items()[0].id, "2");
        assert!(base.todos().items().is_empty());
    }
}
