//! Progress events emitted while an agent runs.

use amaya_tools::{TodoItem, ToolEvent};
use std::time::Duration;

/// What the loop is doing. `depth` is 0 for the top-level loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// About to call the model.
    ModelRequest { depth: u32, iteration: u32 },
    /// Text the model sent alongside tool calls.
    AssistantText { depth: u32, text: String },
    ToolStarted {
        depth: u32,
        call_id: String,
        name: String,
    },
    ToolFinished {
        depth: u32,
        call_id: String,
        name: String,
        is_error: bool,
    },
    TodosUpdated(Vec<TodoItem>),
    /// A provider request failed and will be retried after `delay`.
    Retrying {
        depth: u32,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Completed { depth: u32, iterations: u32 },
    Failed { depth: u32, error: String },
}

impl From<ToolEvent> for AgentEvent {
    fn from(event: ToolEvent) -> Self {
        match event {
            ToolEvent::TodosUpdated(items) => AgentEvent::TodosUpdated(items),
        }
    }
}
