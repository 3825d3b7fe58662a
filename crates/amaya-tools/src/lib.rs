//! Tool implementations for amaya.
//!
//! A model never touches the host directly. It asks for a tool by name,
//! the [`ToolDispatcher`] looks the tool up in a [`ToolRegistry`], checks
//! the granted [`Capability`] set and the argument schema, and only then
//! runs the handler. Every failure on the way becomes a [`ToolResult`]
//! carrying an error the model can read; nothing here aborts the agent
//! loop.

pub mod dispatcher;
pub mod error;
pub mod index;
pub mod registry;
pub mod reminder;
pub mod result;
pub mod schema;

mod backup;

// Tool implementations
pub mod batch;
pub mod edit;
pub mod file_ops;
pub mod find;
pub mod list;
pub mod mcp;
pub mod memory;
pub mod patch;
pub mod read;
pub mod search;
pub mod shell;
pub mod subagent;
pub mod todo;
pub mod undo;
pub mod write;

pub use dispatcher::ToolDispatcher;
pub use error::{HandlerResult, RegistryError, ToolError};
pub use index::{FileIndex, FileMatch, IndexQuery, WorkspaceIndex};
pub use registry::{Builtins, ToolDescriptor, ToolOrigin, ToolRegistry};
pub use reminder::{Recurrence, ReminderScheduler};
pub use result::{ToolErrorKind, ToolOutcome, ToolResult};
pub use subagent::SubagentRunner;
pub use todo::{TodoItem, TodoList};

use amaya_util::PathGuard;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A permission category a tool needs before it may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FilesystemRead,
    FilesystemWrite,
    ShellExec,
    /// Shell commands may chain with `;`, `&&`, pipes and substitutions.
    RawShell,
    Network,
    Scheduler,
    Memory,
    Delegate,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::FilesystemRead,
        Capability::FilesystemWrite,
        Capability::ShellExec,
        Capability::RawShell,
        Capability::Network,
        Capability::Scheduler,
        Capability::Memory,
        Capability::Delegate,
    ];

    /// The set granted when nothing is configured: all but raw shell.
    pub fn default_grants() -> Vec<Capability> {
        Self::ALL
            .into_iter()
            .filter(|c| *c != Capability::RawShell)
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FilesystemRead => "filesystem_read",
            Capability::FilesystemWrite => "filesystem_write",
            Capability::ShellExec => "shell_exec",
            Capability::RawShell => "raw_shell",
            Capability::Network => "network",
            Capability::Scheduler => "scheduler",
            Capability::Memory => "memory",
            Capability::Delegate => "delegate",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event that tools can emit to notify listeners of state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    /// The todo list was replaced or merged.
    TodosUpdated(Vec<TodoItem>),
}

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Id of the tool call being executed.
    pub call_id: String,
    /// Primary allowed root; relative paths resolve against it.
    pub root_dir: PathBuf,
    /// The path and command guard for this run.
    pub guard: Arc<PathGuard>,
    /// Cancellation token, a child of the run's token.
    pub abort: CancellationToken,
    /// Sub-agent nesting depth of the calling loop (0 for the top level).
    pub depth: u32,
    /// Optional event sender for immediate notifications.
    pub event_tx: Option<mpsc::UnboundedSender<ToolEvent>>,
    /// Task list of the calling run.
    pub todos: TodoList,
}

impl ToolContext {
    /// Create a context for a guard, rooted at its primary root.
    pub fn new(guard: Arc<PathGuard>) -> Self {
        let root_dir = guard
            .primary_root()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            call_id: String::new(),
            root_dir,
            guard,
            abort: CancellationToken::new(),
            depth: 0,
            event_tx: None,
            todos: TodoList::new(),
        }
    }

    /// Ask the guard about a model-supplied path.
    ///
    /// Returns the resolved absolute path.
    pub fn resolve_path(&self, path: &str) -> HandlerResult<PathBuf> {
        self.guard.check_path(path).map_err(ToolError::from)
    }

    /// Send an event to the listener, if any.
    pub fn emit(&self, event: ToolEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// Result of tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Title/summary of the operation.
    pub title: String,
    /// Output text, what the model reads.
    pub output: String,
    /// Tool-specific metadata.
    pub metadata: Value,
}

impl ToolOutput {
    /// Create a new tool output.
    pub fn new(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: Value::Null,
        }
    }

    /// Add metadata to the output.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The main trait for tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool ID.
    fn id(&self) -> &str;

    /// Get the tool description (for the AI).
    fn description(&self) -> &str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// The capability a caller must hold to run this tool.
    fn capability(&self) -> Capability;

    /// Execute the tool.
    ///
    /// Arguments have already been validated against
    /// [`Tool::parameters_schema`].
    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput>;
}

/// A boxed tool for dynamic dispatch.
pub type BoxedTool = Arc<dyn Tool>;

/// Deserialize validated arguments into a tool's argument struct.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> HandlerResult<T> {
    serde_json::from_value(args).map_err(|e| ToolError::validation(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_grants_exclude_raw_shell() {
        let grants = Capability::default_grants();
        assert_eq!(grants.len(), Capability::ALL.len() - 1);
        assert!(!grants.contains(&Capability::RawShell));
        assert!(grants.contains(&Capability::ShellExec));
    }

    #[test]
    fn test_capability_serde() {
        let json = serde_json::to_string(&Capability::FilesystemWrite).unwrap();
        assert_eq!(json, "\"filesystem_write\"");
        let parsed: Capability = serde_json::from_str("\"raw_shell\"").unwrap();
        assert_eq!(parsed, Capability::RawShell);
        assert_eq!(Capability::Network.to_string(), "network");
    }

    #[test]
    fn test_context_resolves_through_guard() {
        let dir = tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let resolved = ctx.resolve_path("src/main.rs").unwrap();
        assert!(resolved.starts_with(&ctx.root_dir));
        assert!(matches!(
            ctx.resolve_path("/etc/passwd"),
            Err(ToolError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_emit_without_listener_is_noop() {
        let dir = tempdir().unwrap();
        let ctx = testing::context(dir.path());
        ctx.emit(ToolEvent::TodosUpdated(Vec::new()));
    }

    #[test]
    fn test_tool_output_metadata() {
        let out = ToolOutput::new("t", "o").with_metadata(serde_json::json!({"n": 1}));
        assert_eq!(out.metadata["n"], 1);
    }
}
