//! Write tool - create or overwrite files.

use crate::backup;
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Write `content` through a temp file and a rename, so a reader never
/// sees half a file.
pub(crate) async fn write_atomic(path: &Path, content: &str) -> HandlerResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ToolError::validation(format!("Not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{}.tmp", name));

    fs::write(&temp, content).await?;
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Generate a unified diff.
pub(crate) fn unified_diff(old: &str, new: &str, path: &Path) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- a/{}\n", path.display()));
    output.push_str(&format!("+++ b/{}\n", path.display()));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };
                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }
    output
}

/// Write a file, backing up what was there.
pub struct WriteFileTool;

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
    #[serde(default = "default_true")]
    create_backup: bool,
}

pub(crate) fn default_true() -> bool {
    true
}

#[async_trait]
impl Tool for WriteFileTool {
    fn id(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        r#"Writes a file to the workspace, replacing it if it exists.

- Parent directories are created as needed
- The previous content is saved to .backup/ next to the file (create_backup, default true) and can be restored with undo_change
- Prefer edit_file for changing part of an existing file"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The complete new content"
                },
                "create_backup": {
                    "type": "boolean",
                    "description": "Back up the previous content (default: true)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemWrite
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: WriteArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;

        if path.is_dir() {
            return Err(ToolError::validation(format!(
                "{} is a directory",
                args.path
            )));
        }

        // Non-UTF-8 content still gets backed up, just not diffed.
        let previous = fs::read_to_string(&path).await.ok();
        let existed = path.exists();

        let backup = if args.create_backup {
            backup::create(&path).await?
        } else {
            None
        };

        write_atomic(&path, &args.content).await?;
        debug!(path = %path.display(), bytes = args.content.len(), "Wrote file");

        let mut output = format!(
            "{} {} ({} bytes)",
            if existed { "Updated" } else { "Created" },
            args.path,
            args.content.len()
        );
        if let Some(backup) = &backup {
            output.push_str(&format!("\nBackup saved to: {}", backup.display()));
        }

        let diff = previous
            .map(|old| unified_diff(&old, &args.content, Path::new(&args.path)))
            .unwrap_or_default();

        Ok(ToolOutput::new(format!("Write {}", args.path), output).with_metadata(json!({
            "path": path.display().to_string(),
            "created": !existed,
            "backup": backup.map(|b| b.display().to_string()),
            "diff": diff
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::fs as stdfs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_new_file_with_parents() {
        let dir = tempdir().unwrap();
        let out = WriteFileTool
            .execute(
                json!({"path": "src/new/mod.rs", "content": "pub mod x;\n"}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.output.starts_with("Created src/new/mod.rs"));
        assert_eq!(out.metadata["created"], true);
        assert_eq!(
            stdfs::read_to_string(dir.path().join("src/new/mod.rs")).unwrap(),
            "pub mod x;\n"
        );
        assert!(!dir.path().join("src/new/.backup").exists());
    }

    #[tokio::test]
    async fn test_overwrite_creates_backup_and_diff() {
        let dir = tempdir().unwrap();
        stdfs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();

        let out = WriteFileTool
            .execute(
                json!({"path": "a.txt", "content": "one\nthree\n"}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.output.contains("Backup saved to:"));
        let diff = out.metadata["diff"].as_str().unwrap();
        assert!(diff.contains("-two\n"));
        assert!(diff.contains("+three\n"));

        let backups = backup::list(&dir.path().join("a.txt")).await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(stdfs::read_to_string(&backups[0]).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_overwrite_without_backup() {
        let dir = tempdir().unwrap();
        stdfs::write(dir.path().join("a.txt"), "old").unwrap();
        WriteFileTool
            .execute(
                json!({"path": "a.txt", "content": "new", "create_backup": false}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert!(!dir.path().join(".backup").exists());
    }

    #[tokio::test]
    async fn test_write_outside_root_is_denied() {
        let dir = tempdir().unwrap();
        let err = WriteFileTool
            .execute(
                json!({"path": "../escape.txt", "content": "x"}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }
}
