//! Todo tool - the agent's running task list.
//!
//! The tool itself is stateless. The list is a [`TodoList`] carried in the
//! [`ToolContext`], one per dispatcher run, so each run and each sub-agent
//! starts empty. Every update is also pushed to listeners as
//! [`ToolEvent::TodosUpdated`].

use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolEvent, ToolOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Todo status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
        }
    }

    /// Get display icon for the status.
    pub fn icon(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[>]",
            TodoStatus::Completed => "[x]",
        }
    }

    /// Lenient parse; anything unrecognised is pending.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "in_progress" | "inprogress" | "active" => TodoStatus::InProgress,
            "completed" | "done" | "finished" => TodoStatus::Completed,
            _ => TodoStatus::Pending,
        }
    }
}

/// A todo item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodoItem {
    pub id: String,
    pub status: TodoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_form: Option<String>,
}

/// Numeric ids sort numerically, so "10" comes after "9".
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[derive(Debug, Deserialize)]
struct RawTodo {
    id: Value,
    status: Option<String>,
    content: Option<String>,
    active_form: Option<String>,
}

impl RawTodo {
    fn into_item(self) -> HandlerResult<TodoItem> {
        let id = match self.id {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ToolError::validation(format!(
                    "todo id must be a non-empty string or a number, got {}",
                    other
                )))
            }
        };
        Ok(TodoItem {
            id,
            status: self
                .status
                .as_deref()
                .map(TodoStatus::parse)
                .unwrap_or(TodoStatus::Pending),
            content: self.content,
            active_form: self.active_form,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TodoArgs {
    todos: Vec<RawTodo>,
    #[serde(default = "crate::write::default_true")]
    merge: bool,
}

/// The task list of one run.
///
/// Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct TodoList {
    items: Arc<RwLock<Vec<TodoItem>>>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current list.
    pub fn items(&self) -> Vec<TodoItem> {
        self.items
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn apply(&self, incoming: Vec<TodoItem>, merge: bool) -> Vec<TodoItem> {
        let mut items = self
            .items
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if merge {
            for item in incoming {
                match items.iter_mut().find(|existing| existing.id == item.id) {
                    Some(existing) => {
                        existing.status = item.status;
                        if item.content.is_some() {
                            existing.content = item.content;
                        }
                        if item.active_form.is_some() {
                            existing.active_form = item.active_form;
                        }
                    }
                    None => items.push(item),
                }
            }
            items.sort_by(|a, b| compare_ids(&a.id, &b.id));
        } else {
            *items = incoming;
        }
        items.clone()
    }
}

/// Replace or merge the task list of the calling run.
#[derive(Debug, Default)]
pub struct UpdateTodoTool;

impl UpdateTodoTool {
    pub fn new() -> Self {
        Self
    }
}

fn render(items: &[TodoItem]) -> String {
    let completed = items
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count();
    let mut output = format!("Todo updated: {}/{} completed", completed, items.len());
    for item in items {
        output.push_str(&format!(
            "\n{} {}. {}",
            item.status.icon(),
            item.id,
            item.content.as_deref().unwrap_or("")
        ));
    }
    output
}

#[async_trait]
impl Tool for UpdateTodoTool {
    fn id(&self) -> &str {
        "update_todo"
    }

    fn description(&self) -> &str {
        r#"Update the task list for the current run. Use it to plan multi-step work and report progress.

- merge=true (default) updates items by id and adds new ones; merge=false replaces the whole list
- status: pending, in_progress or completed
- Keep exactly one item in_progress while working"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["todos"],
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "Todo items",
                    "items": {
                        "type": "object",
                        "required": ["id"],
                        "properties": {
                            "id": { "type": ["string", "integer"] },
                            "status": {
                                "type": "string",
                                "description": "pending, in_progress or completed"
                            },
                            "content": { "type": "string" },
                            "active_form": {
                                "type": "string",
                                "description": "Present-tense form shown while in progress"
                            }
                        }
                    }
                },
                "merge": {
                    "type": "boolean",
                    "description": "Merge into the existing list (default: true)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::Memory
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: TodoArgs = parse_args(args)?;
        let incoming = args
            .todos
            .into_iter()
            .map(RawTodo::into_item)
            .collect::<HandlerResult<Vec<_>>>()?;

        let items = ctx.todos.apply(incoming, args.merge);
        debug!(count = items.len(), merge = args.merge, "Todo list updated");
        ctx.emit(ToolEvent::TodosUpdated(items.clone()));

        let completed = items
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        Ok(ToolOutput::new(
            format!("{} todos", items.len() - completed),
            render(&items),
        )
        .with_metadata(json!({ "todos": items })))
    }
}
