//! Logging setup and verbose progress output.

use amaya_core::AgentEvent;
use amaya_util::log::{LogConfig, LogLevel};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Initialize logging once for the process.
///
/// Verbose runs log at debug level to stderr; otherwise events go to the
/// log file in the data directory. Returns the log file in use.
pub fn init_logging(verbose: bool) -> Option<PathBuf> {
    amaya_util::log::init(LogConfig {
        print: verbose,
        level: if verbose { LogLevel::Debug } else { LogLevel::Info },
        include_location: false,
        file: None,
    })
}

/// Print agent progress to stderr until the channel closes.
pub fn spawn_event_printer(mut rx: mpsc::UnboundedReceiver<AgentEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = describe(&event) {
                eprintln!("{line}");
            }
        }
    });
}

fn indent(depth: u32) -> String {
    "  ".repeat(depth as usize)
}

fn describe(event: &AgentEvent) -> Option<String> {
    Some(match event {
        AgentEvent::ModelRequest { depth, iteration } => {
            format!("{}> model request #{iteration}", indent(*depth))
        }
        AgentEvent::AssistantText { depth, text } => {
            format!("{}  {}", indent(*depth), text.trim())
        }
        AgentEvent::ToolStarted { depth, name, .. } => {
            format!("{}  - {name}", indent(*depth))
        }
        AgentEvent::ToolFinished {
            depth,
            name,
            is_error: true,
            ..
        } => format!("{}  x {name} failed", indent(*depth)),
        AgentEvent::ToolFinished { .. } => return None,
        AgentEvent::TodosUpdated(items) => {
            let done = items
                .iter()
                .filter(|t| t.status == amaya_tools::todo::TodoStatus::Completed)
                .count();
            format!("  todos: {done}/{} done", items.len())
        }
        AgentEvent::Retrying {
            depth,
            attempt,
            delay,
            error,
        } => format!(
            "{}  retry {attempt} in {:.1}s: {error}",
            indent(*depth),
            delay.as_secs_f32()
        ),
        AgentEvent::Completed { depth, iterations } => {
            format!("{}< done after {iterations} model calls", indent(*depth))
        }
        AgentEvent::Failed { depth, error } => format!("{}< failed: {error}", indent(*depth)),
    })
}
