//! Memory tool - notes that outlive a single run.
//!
//! Layout under the configured memory directory:
//!
//! ```text
//! MEMORY.md              long-term facts, grouped under `## <section>`
//! memory/YYYY-MM-DD.md   one timestamped bullet per daily note
//! ```

use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// MEMORY.md is not grown past this size.
const MAX_MEMORY_BYTES: u64 = 512 * 1024;

const DEFAULT_SECTION: &str = "Important Facts";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Target {
    #[default]
    Daily,
    Long,
}

#[derive(Debug, Deserialize)]
struct MemoryArgs {
    content: String,
    #[serde(default)]
    target: Target,
    section: Option<String>,
}

/// Append to the daily log or to MEMORY.md.
pub struct UpdateMemoryTool {
    dir: PathBuf,
    // Concurrent calls in one turn must not interleave read-modify-write.
    lock: Mutex<()>,
}

impl UpdateMemoryTool {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    async fn write_daily(&self, content: &str) -> HandlerResult<ToolOutput> {
        let now = Local::now();
        let date = now.format("%Y-%m-%d").to_string();
        let log_dir = self.dir.join("memory");
        fs::create_dir_all(&log_dir).await?;
        let path = log_dir.join(format!("{}.md", date));

        let mut entry = String::new();
        if !fs::try_exists(&path).await.unwrap_or(false) {
            entry.push_str(&format!("# {}\n\n", date));
        }
        entry.push_str(&format!("- {} {}\n", now.format("%H:%M"), content));

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %path.display(), "Appended daily memory");

        Ok(ToolOutput::new(
            "Memory noted",
            format!("Noted in today's memory log ({}.md): \"{}\"", date, content),
        )
        .with_metadata(json!({ "target": "daily", "date": date, "path": path.display().to_string() })))
    }

    async fn write_long(&self, content: &str, section: &str) -> HandlerResult<ToolOutput> {
        let path = self.dir.join("MEMORY.md");
        let current = match fs::metadata(&path).await {
            Ok(metadata) if metadata.len() > MAX_MEMORY_BYTES => {
                return Err(ToolError::validation(
                    "MEMORY.md has reached the size limit (512KB). Ask the user to review and trim old entries before adding more.",
                ));
            }
            Ok(_) => fs::read_to_string(&path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let updated = insert_under_section(&current, section, content);
        fs::create_dir_all(&self.dir).await?;
        crate::write::write_atomic(&path, &updated).await?;
        debug!(path = %path.display(), section, "Updated long-term memory");

        Ok(ToolOutput::new(
            "Memory saved",
            format!(
                "Saved to long-term memory (MEMORY.md) under \"{}\": \"{}\"",
                section, content
            ),
        )
        .with_metadata(json!({ "target": "long", "section": section })))
    }
}

/// Newest entries go directly below the heading. A missing heading is
/// appended at the end.
fn insert_under_section(current: &str, section: &str, content: &str) -> String {
    let header = format!("## {}", section);
    let entry = format!("- {}", content);

    let mut lines: Vec<&str> = current.lines().collect();
    match lines.iter().position(|line| line.trim_end() == header) {
        Some(at) => {
            lines.insert(at + 1, &entry);
            let mut updated = lines.join("\n");
            updated.push('\n');
            updated
        }
        None => {
            let body = current.trim_end();
            if body.is_empty() {
                format!("{}\n{}\n", header, entry)
            } else {
                format!("{}\n\n{}\n{}\n", body, header, entry)
            }
        }
    }
}

#[async_trait]
impl Tool for UpdateMemoryTool {
    fn id(&self) -> &str {
        "update_memory"
    }

    fn description(&self) -> &str {
        r#"Persist important information for future sessions.

Use this when the user shares something worth keeping (a name, a preference, an ongoing goal), when something meaningful happened, or when asked to remember something.

- content: a clear, self-contained sentence
- target: "daily" (default) writes to today's log, "long" writes to MEMORY.md
- section: heading in MEMORY.md to write under (default "Important Facts"); only used with target="long""#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["content"],
            "properties": {
                "content": {
                    "type": "string",
                    "minLength": 1,
                    "description": "What to remember"
                },
                "target": {
                    "type": "string",
                    "enum": ["daily", "long"],
                    "description": "daily log or long-term MEMORY.md (default: daily)"
                },
                "section": {
                    "type": "string",
                    "description": "MEMORY.md section heading"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::Memory
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: MemoryArgs = parse_args(args)?;
        // One line per entry keeps both files greppable.
        let content = args.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if content.is_empty() {
            return Err(ToolError::validation("content must not be empty"));
        }

        let _guard = self.lock.lock().await;
        match args.target {
            Target::Daily => self.write_daily(&content).await,
            Target::Long => {
                let section = args
                    .section
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(DEFAULT_SECTION);
                self.write_long(&content, section).await
            }
        }
    }
}
