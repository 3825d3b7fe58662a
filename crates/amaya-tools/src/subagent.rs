//! Sub-agent tool - fan a task out to parallel child agents.
//!
//! The tool only knows how to split and collect. Running a child loop is
//! the job of a [`SubagentRunner`], which the agent runtime provides; this
//! keeps the tool crate free of any dependency on the loop itself.

use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name under which the tool is registered. Sub-agents never get it.
pub const INVOKE_SUBAGENTS: &str = "invoke_subagents";

/// Default number of sub-agents per call.
pub const DEFAULT_MAX_SUBAGENTS: usize = 4;

/// Runs one child agent to completion.
#[async_trait]
pub trait SubagentRunner: Send + Sync {
    /// Run `task` as a fresh conversation one level below `parent_depth`.
    ///
    /// Returns the child's final answer, or a readable failure reason.
    async fn run_subagent(
        &self,
        task: &str,
        parent_depth: u32,
        cancel: CancellationToken,
    ) -> Result<String, String>;
}

#[derive(Debug, Deserialize)]
struct SubagentSpec {
    task_name: Option<String>,
    task: String,
}

#[derive(Debug, Deserialize)]
struct InvokeArgs {
    subagents: Vec<SubagentSpec>,
}

/// Spawn independent sub-agents in parallel with staggered starts.
pub struct InvokeSubagentsTool {
    runner: Arc<dyn SubagentRunner>,
    max_subagents: usize,
    stagger: Duration,
}

impl InvokeSubagentsTool {
    pub fn new(runner: Arc<dyn SubagentRunner>, max_subagents: usize, stagger: Duration) -> Self {
        Self {
            runner,
            max_subagents: max_subagents.max(1),
            stagger,
        }
    }
}

#[async_trait]
impl Tool for InvokeSubagentsTool {
    fn id(&self) -> &str {
        INVOKE_SUBAGENTS
    }

    fn description(&self) -> &str {
        r#"Spawn independent sub-agents that run in parallel, each with its own task.

- Each sub-agent has the file and shell tools but cannot spawn sub-agents itself
- Sub-agents do not see this conversation: put all needed context in the task
- Use this when work splits into independent parts (e.g. auditing several directories)
- Returns the final answer of every sub-agent"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["subagents"],
            "properties": {
                "subagents": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": self.max_subagents,
                    "description": "Tasks to run in parallel",
                    "items": {
                        "type": "object",
                        "required": ["task"],
                        "properties": {
                            "task_name": {
                                "type": "string",
                                "description": "Short label for the result"
                            },
                            "task": {
                                "type": "string",
                                "minLength": 1,
                                "description": "Complete, self-contained instructions"
                            }
                        }
                    }
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::Delegate
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: InvokeArgs = parse_args(args)?;
        if args.subagents.is_empty() {
            return Err(ToolError::validation("subagents must not be empty"));
        }
        if args.subagents.len() > self.max_subagents {
            return Err(ToolError::validation(format!(
                "At most {} sub-agents per call, got {}",
                self.max_subagents,
                args.subagents.len()
            )));
        }

        let names: Vec<String> = args
            .subagents
            .iter()
            .enumerate()
            .map(|(i, s)| {
                s.task_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Subagent {}", i + 1))
            })
            .collect();
        info!(count = args.subagents.len(), depth = ctx.depth, "Spawning sub-agents");

        let runs = args.subagents.iter().enumerate().map(|(i, spec)| {
            let runner = self.runner.clone();
            let cancel = ctx.abort.child_token();
            let delay = self.stagger * i as u32;
            let depth = ctx.depth;
            async move {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err("Cancelled".to_string()),
                    }
                }
                runner.run_subagent(&spec.task, depth, cancel).await
            }
        });

        let results = tokio::select! {
            results = join_all(runs) => results,
            _ = ctx.abort.cancelled() => return Err(ToolError::Cancelled),
        };

        let failed = results.iter().filter(|r| r.is_err()).count();
        let mut output = format!(
            "=== SUBAGENT RESULTS ({} agents ran in parallel) ===\n\n",
            results.len()
        );
        for (name, result) in names.iter().zip(&results) {
            output.push_str(&format!("--- [{}] ---\n", name));
            match result {
                Ok(answer) if answer.trim().is_empty() => output.push_str("No output."),
                Ok(answer) => output.push_str(answer.trim()),
                Err(reason) => output.push_str(&format!("[ERROR] {}", reason)),
            }
            output.push_str("\n\n");
        }
        output.push_str("=== END OF SUBAGENT RESULTS ===");
        debug!(failed, "Sub-agents finished");

        Ok(ToolOutput::new(
            format!("{} sub-agents", results.len()),
            output,
        )
        .with_metadata(json!({ "count": results.len(), "failed": failed })))
    }
}
