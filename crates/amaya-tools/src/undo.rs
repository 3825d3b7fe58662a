//! Undo tool - restore a file from its newest backup.

use crate::backup;
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

pub struct UndoChangeTool;

#[derive(Debug, Deserialize)]
struct UndoArgs {
    path: String,
    #[serde(default)]
    list_backups: bool,
}

/// `notes.txt.bak.1700000000000` -> local time of the stamp.
fn backup_time(backup: &Path) -> Option<String> {
    let name = backup.file_name()?.to_string_lossy().into_owned();
    let millis: i64 = name.rsplit('.').next()?.parse().ok()?;
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[async_trait]
impl Tool for UndoChangeTool {
    fn id(&self) -> &str {
        "undo_change"
    }

    fn description(&self) -> &str {
        r#"Undo the last change to a file by restoring it from backup.

Backups are created automatically by write_file, edit_file and apply_diff.
Set list_backups to see the available backups instead of restoring."#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file to restore"
                },
                "list_backups": {
                    "type": "boolean",
                    "description": "List available backups instead of restoring (default: false)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemWrite
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: UndoArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;

        let backups = backup::list(&path).await?;
        let Some(latest) = backups.first() else {
            return Err(ToolError::execution_failed(format!(
                "No backups found for: {}",
                args.path
            )));
        };

        if args.list_backups {
            let mut output = format!("Available backups for {}:\n\n", args.path);
            for (i, backup) in backups.iter().enumerate() {
                let name = backup
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match backup_time(backup) {
                    Some(time) => output.push_str(&format!("{}. {} ({})\n", i + 1, name, time)),
                    None => output.push_str(&format!("{}. {}\n", i + 1, name)),
                }
            }
            return Ok(ToolOutput::new(format!("Backups of {}", args.path), output)
                .with_metadata(json!({ "count": backups.len() })));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(latest, &path).await?;
        // The restored backup is consumed so a second undo goes further back.
        tokio::fs::remove_file(latest).await?;
        debug!(path = %path.display(), backup = %latest.display(), "Restored backup");

        Ok(ToolOutput::new(
            format!("Undo {}", args.path),
            format!(
                "Restored {} from backup: {}",
                args.path,
                latest.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ),
        )
        .with_metadata(json!({
            "restored_from": latest.display().to_string(),
            "remaining_backups": backups.len() - 1
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::write::WriteFileTool;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_undo_walks_back_through_backups() {
        let dir = tempdir().unwrap();
        let ctx = testing::context(dir.path());
        fs::write(dir.path().join("a.txt"), "v1").unwrap();

        for content in ["v2", "v3"] {
            WriteFileTool
                .execute(json!({"path": "a.txt", "content": content}), &ctx)
                .await
                .unwrap();
        }

        let listed = UndoChangeTool
            .execute(json!({"path": "a.txt", "list_backups": true}), &ctx)
            .await
            .unwrap();
        assert_eq!(listed.metadata["count"], 2);
        assert!(listed.output.contains("1. a.txt.bak."));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "v3");

        UndoChangeTool
            .execute(json!({"path": "a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "v2");

        let out = UndoChangeTool
            .execute(json!({"path": "a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.metadata["remaining_backups"], 0);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_undo_without_backups() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "v1").unwrap();
        let err = UndoChangeTool
            .execute(json!({"path": "a.txt"}), &testing::context(dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No backups found"));
    }
}
