//! Tool registry.
//!
//! A registry is built once per agent run: local tools first, then
//! whatever the MCP bridge reports ready. It is read-only while the loop
//! runs.

use crate::index::FileIndex;
use crate::reminder::ReminderScheduler;
use crate::subagent::INVOKE_SUBAGENTS;
use crate::{BoxedTool, Capability, RegistryError};
use amaya_provider::ToolDefinition;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a tool comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOrigin {
    Local,
    /// Discovered on the named MCP server.
    Mcp(String),
}

/// A registered tool: name, argument schema, capability and handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub capability: Capability,
    pub handler: BoxedTool,
    pub origin: ToolOrigin,
}

impl ToolDescriptor {
    /// Describe a local tool from its own metadata.
    pub fn local(tool: BoxedTool) -> Self {
        Self {
            name: tool.id().to_string(),
            description: tool.description().to_string(),
            schema: tool.parameters_schema(),
            capability: tool.capability(),
            handler: tool,
            origin: ToolOrigin::Local,
        }
    }

    /// The declaration sent to the model.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.clone(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == ToolOrigin::Local
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("origin", &self.origin)
            .finish()
    }
}

/// A remote tool that lost a name collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedTool {
    pub name: String,
    /// Server whose tool was dropped.
    pub server: String,
    /// Origin of the tool that kept the name.
    pub kept: ToolOrigin,
}

/// Collaborators the built-in tools need.
#[derive(Clone)]
pub struct Builtins {
    pub index: Arc<dyn FileIndex>,
    /// Reminders are only offered when a scheduler is available.
    pub scheduler: Option<Arc<dyn ReminderScheduler>>,
    /// Memory notes are only offered when a memory directory is set.
    pub memory_dir: Option<PathBuf>,
    pub shell_timeout_ms: u64,
    pub shell_max_timeout_ms: u64,
}

impl Builtins {
    pub fn new(index: Arc<dyn FileIndex>) -> Self {
        Self {
            index,
            scheduler: None,
            memory_dir: None,
            shell_timeout_ms: crate::shell::DEFAULT_TIMEOUT_MS,
            shell_max_timeout_ms: crate::shell::MAX_TIMEOUT_MS,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn ReminderScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_memory_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.memory_dir = Some(dir.into());
        self
    }
}

/// Registry of available tools.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
    shadowed: Vec<ShadowedTool>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in tools.
    ///
    /// `invoke_subagents` is not included; it needs a runner and is
    /// registered by whoever owns one.
    pub fn with_builtins(builtins: &Builtins) -> Self {
        use crate::{
            batch, edit, file_ops, find, list, memory, patch, read, reminder, search, shell,
            todo, undo, write,
        };

        let mut registry = Self::new();
        let mut tools: Vec<BoxedTool> = vec![
            Arc::new(list::ListFilesTool),
            Arc::new(read::ReadFileTool),
            Arc::new(batch::BatchReadTool),
            Arc::new(write::WriteFileTool),
            Arc::new(edit::EditFileTool),
            Arc::new(patch::ApplyDiffTool),
            Arc::new(undo::UndoChangeTool),
            Arc::new(file_ops::CreateDirectoryTool),
            Arc::new(file_ops::DeleteFileTool),
            Arc::new(file_ops::CopyFileTool),
            Arc::new(file_ops::MoveFileTool),
            Arc::new(file_ops::GetFileInfoTool),
            Arc::new(find::FindFilesTool::new(builtins.index.clone())),
            Arc::new(search::SearchFilesTool::new(builtins.index.clone())),
            Arc::new(shell::RunShellTool::new(
                builtins.shell_timeout_ms,
                builtins.shell_max_timeout_ms,
            )),
            Arc::new(todo::UpdateTodoTool::new()),
        ];
        if let Some(scheduler) = &builtins.scheduler {
            tools.push(Arc::new(reminder::CreateReminderTool::new(scheduler.clone())));
        }
        if let Some(dir) = &builtins.memory_dir {
            tools.push(Arc::new(memory::UpdateMemoryTool::new(dir.clone())));
        }

        for tool in tools {
            registry.insert(ToolDescriptor::local(tool));
        }
        registry
    }

    fn insert(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    /// Register a descriptor. Names are unique within a registry.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }
        debug!(tool = %descriptor.name, origin = ?descriptor.origin, "Registered tool");
        self.insert(descriptor);
        Ok(())
    }

    /// Register a local tool.
    pub fn register_tool(&mut self, tool: BoxedTool) -> Result<(), RegistryError> {
        self.register(ToolDescriptor::local(tool))
    }

    /// Merge a tool discovered on an MCP server.
    ///
    /// A name already taken keeps its current owner; the remote tool is
    /// recorded in [`ToolRegistry::shadowed`]. Returns whether the tool
    /// was added.
    pub fn merge_remote(&mut self, descriptor: ToolDescriptor) -> bool {
        let server = match &descriptor.origin {
            ToolOrigin::Mcp(server) => server.clone(),
            ToolOrigin::Local => String::new(),
        };

        if let Some(existing) = self.tools.get(&descriptor.name) {
            warn!(
                tool = %descriptor.name,
                server = %server,
                kept = ?existing.origin,
                "MCP tool shadowed by an existing tool with the same name"
            );
            self.shadowed.push(ShadowedTool {
                name: descriptor.name,
                server,
                kept: existing.origin.clone(),
            });
            return false;
        }

        debug!(tool = %descriptor.name, server = %server, "Merged MCP tool");
        self.insert(descriptor);
        true
    }

    /// Look a tool up by name.
    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor, RegistryError> {
        self.tools
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Remote tools dropped because of a name collision.
    pub fn shadowed(&self) -> &[ShadowedTool] {
        &self.shadowed
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// All tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Names of local tools, sorted.
    pub fn local_names(&self) -> Vec<String> {
        self.tools
            .values()
            .filter(|d| d.is_local())
            .map(|d| d.name.clone())
            .collect()
    }

    /// Declarations for every tool, for the provider request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(ToolDescriptor::definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A registry holding only the named tools.
    ///
    /// `invoke_subagents` is never carried over, whatever `names` says.
    /// Unknown names are ignored.
    pub fn restricted<S: AsRef<str>>(&self, names: &[S]) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in names {
            let name = name.as_ref();
            if name == INVOKE_SUBAGENTS {
                continue;
            }
            if let Some(descriptor) = self.tools.get(name) {
                registry.insert(descriptor.clone());
            }
        }
        registry
    }
}
