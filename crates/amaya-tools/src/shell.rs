//! Shell tool - run commands inside the workspace.

use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Default timeout (30 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Maximum timeout (5 minutes).
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Shortest timeout a caller may ask for.
const MIN_TIMEOUT_MS: u64 = 1_000;

/// Maximum output size in characters.
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Run a shell command.
pub struct RunShellTool {
    default_timeout_ms: u64,
    max_timeout_ms: u64,
}

impl RunShellTool {
    pub fn new(default_timeout_ms: u64, max_timeout_ms: u64) -> Self {
        Self {
            default_timeout_ms,
            max_timeout_ms: max_timeout_ms.max(MIN_TIMEOUT_MS),
        }
    }

    fn timeout(&self, requested: Option<u64>) -> Duration {
        let ms = requested
            .unwrap_or(self.default_timeout_ms)
            .clamp(MIN_TIMEOUT_MS, self.max_timeout_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RunShellTool {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS)
    }
}

#[derive(Debug, Deserialize)]
struct ShellArgs {
    command: String,
    working_dir: Option<String>,
    timeout_ms: Option<u64>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[async_trait]
impl Tool for RunShellTool {
    fn id(&self) -> &str {
        "run_shell"
    }

    fn description(&self) -> &str {
        r#"Run a shell command and return its output.

Use this for git, build tools and test runners. Prefer the file tools for
reading, writing and searching files.

- working_dir must be inside the workspace (default: workspace root)
- timeout_ms: 1000 to 300000 (default: 30000)
- env: extra environment variables
- Output is stdout followed by stderr, truncated to 30000 characters
- Dangerous commands and command chaining are refused"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Directory to run the command in"
                },
                "timeout_ms": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Timeout in milliseconds"
                },
                "env": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Environment variables to set"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::ShellExec
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: ShellArgs = parse_args(args)?;

        if let Err(denied) = ctx.guard.check_command(&args.command) {
            warn!(command = %args.command, reason = %denied.reason, "Shell command denied");
            return Err(denied.into());
        }

        let workdir = match &args.working_dir {
            Some(dir) => ctx.resolve_path(dir)?,
            None => ctx.root_dir.clone(),
        };
        if !workdir.is_dir() {
            return Err(ToolError::validation(format!(
                "Working directory does not exist: {}",
                workdir.display()
            )));
        }

        let timeout = self.timeout(args.timeout_ms);
        debug!(
            command = %args.command,
            workdir = %workdir.display(),
            timeout_ms = timeout.as_millis() as u64,
            "Executing shell command"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        let mut child = spawn(&args.command, &workdir, &args.env)?;
        let pid = child.id();
        let stdout_handle = tokio::spawn(read_all(child.stdout.take()));
        let stderr_handle = tokio::spawn(read_all(child.stderr.take()));
        let abort_readers = {
            let (out, err) = (stdout_handle.abort_handle(), stderr_handle.abort_handle());
            move || {
                out.abort();
                err.abort();
            }
        };

        // Dropping the child on either early return kills the shell; the
        // group kill reaches whatever it started.
        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(command = %args.command, "Shell command timed out");
                kill_process_group(pid).await;
                abort_readers();
                return Err(ToolError::Timeout(timeout));
            }
            _ = ctx.abort.cancelled() => {
                kill_process_group(pid).await;
                abort_readers();
                return Err(ToolError::Cancelled);
            }
        };

        // Background children can hold the pipes open after the shell exits.
        let readers = async move {
            let stdout = stdout_handle.await.unwrap_or_default();
            let stderr = stderr_handle.await.unwrap_or_default();
            (stdout, stderr)
        };
        tokio::pin!(readers);
        let mut lingering = false;
        let (stdout_bytes, stderr_bytes) = tokio::select! {
            output = &mut readers => output,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(command = %args.command, "Background processes outlived the timeout");
                lingering = true;
                kill_process_group(pid).await;
                match tokio::time::timeout(DRAIN_GRACE, &mut readers).await {
                    Ok(output) => output,
                    Err(_) => {
                        abort_readers();
                        (Vec::new(), Vec::new())
                    }
                }
            }
            _ = ctx.abort.cancelled() => {
                kill_process_group(pid).await;
                abort_readers();
                return Err(ToolError::Cancelled);
            }
        };

        let exit_code = status.code().unwrap_or(-1);

        let mut output = String::from_utf8_lossy(&stdout_bytes).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        if !stderr.is_empty() {
            if !output.is_empty() {
                output.push_str("\n\n");
            }
            output.push_str("--- stderr ---\n");
            output.push_str(&stderr);
        }
        if !status.success() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!("[exit code: {}]", exit_code));
        }
        if lingering {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("[background processes killed after timeout]");
        }
        if output.is_empty() {
            output.push_str("(no output)");
        }

        let (output, truncated) = truncate_output(&output, MAX_OUTPUT_CHARS);
        if truncated {
            warn!(command = %args.command, "Output truncated to {} chars", MAX_OUTPUT_CHARS);
        }

        let title = if status.success() {
            truncate_command(&args.command)
        } else {
            format!("{} (exit code: {})", truncate_command(&args.command), exit_code)
        };

        Ok(ToolOutput::new(title, output).with_metadata(json!({
            "exit_code": exit_code,
            "workdir": workdir.display().to_string(),
            "truncated": truncated
        })))
    }
}

/// Start `command` under bash, or sh where bash is missing.
fn spawn(command: &str, workdir: &Path, env: &BTreeMap<String, String>) -> HandlerResult<Child> {
    let build = |shell: &str| {
        let mut cmd = Command::new(shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("TERM", "dumb")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("NO_COLOR", "1")
            .envs(env);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    };

    match build("bash").spawn() {
        Ok(child) => Ok(child),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => build("sh")
            .spawn()
            .map_err(|e| ToolError::execution_failed(format!("Failed to spawn process: {e}"))),
        Err(e) => Err(ToolError::execution_failed(format!(
            "Failed to spawn process: {e}"
        ))),
    }
}

/// How long pipe readers get to finish once their writers are killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// SIGKILL the process group led by `pid`.
async fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        let killed = Command::new("sh")
            .arg("-c")
            .arg(format!("kill -KILL -- -{pid}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = killed {
            debug!(pid, error = %e, "Failed to kill process group");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

async fn read_all<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await.ok();
    }
    buf
}

/// Truncate command for display in title.
fn truncate_command(cmd: &str) -> String {
    let first_line = cmd.lines().next().unwrap_or(cmd);
    if first_line.chars().count() > 50 {
        let cut: String = first_line.chars().take(47).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

/// Keep the head and the tail of long output.
fn truncate_output(output: &str, max_chars: usize) -> (String, bool) {
    let total = output.chars().count();
    if total <= max_chars {
        return (output.to_string(), false);
    }

    let keep_start = max_chars * 2 / 3;
    let keep_end = max_chars - keep_start - 100;
    let start: String = output.chars().take(keep_start).collect();
    let end: String = output.chars().skip(total - keep_end).collect();

    (
        format!(
            "{}\n\n... [truncated {} chars] ...\n\n{}",
            start,
            total - keep_start - keep_end,
            end
        ),
        true,
    )
}
