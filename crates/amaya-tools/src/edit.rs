//! Edit tool - exact string replacement.

use crate::backup;
use crate::write::{default_true, unified_diff, write_atomic};
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

pub struct EditFileTool;

#[derive(Debug, Deserialize)]
struct EditArgs {
    path: String,
    old_content: String,
    new_content: String,
    #[serde(default)]
    all_occurrences: bool,
    #[serde(default)]
    dry_run: bool,
    #[serde(default = "default_true")]
    create_backup: bool,
}

#[async_trait]
impl Tool for EditFileTool {
    fn id(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        r#"Performs exact string replacements in a file.

Usage:
- old_content must match the file exactly, including whitespace and indentation
- Only the first occurrence is replaced unless all_occurrences is true
- dry_run shows the resulting diff without writing
- The previous content is backed up (create_backup, default true)"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path", "old_content", "new_content"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file to modify"
                },
                "old_content": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The text to replace"
                },
                "new_content": {
                    "type": "string",
                    "description": "The text to replace it with"
                },
                "all_occurrences": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default: false)"
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Preview the change without writing (default: false)"
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
        let args: EditArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;

        if args.old_content.is_empty() {
            return Err(ToolError::validation("old_content must not be empty"));
        }
        if args.old_content == args.new_content {
            return Err(ToolError::validation(
                "old_content and new_content are identical",
            ));
        }

        let current = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::file_not_found(&args.path))
            }
            Err(e) => return Err(e.into()),
        };

        let occurrences = current.matches(args.old_content.as_str()).count();
        if occurrences == 0 {
            return Err(ToolError::validation(
                "old_content not found in file. It must match exactly, including whitespace.",
            ));
        }

        let (updated, replaced) = if args.all_occurrences {
            (
                current.replace(&args.old_content, &args.new_content),
                occurrences,
            )
        } else {
            (
                current.replacen(&args.old_content, &args.new_content, 1),
                1,
            )
        };
        let diff = unified_diff(&current, &updated, Path::new(&args.path));

        if args.dry_run {
            return Ok(ToolOutput::new(
                format!("Edit {} (dry run)", args.path),
                format!(
                    "DRY RUN - no changes made\nWould replace {} of {} occurrence(s)\n\n{}",
                    replaced, occurrences, diff
                ),
            )
            .with_metadata(json!({
                "dry_run": true,
                "occurrences": occurrences,
                "would_replace": replaced
            })));
        }

        let backup = if args.create_backup {
            backup::create(&path).await?
        } else {
            None
        };
        write_atomic(&path, &updated).await?;
        debug!(path = %path.display(), replaced, "Edited file");

        let mut output = format!("Replaced {} occurrence(s) in {}", replaced, args.path);
        if let Some(backup) = &backup {
            output.push_str(&format!("\nBackup saved to: {}", backup.display()));
        }
        if occurrences > replaced {
            output.push_str(&format!(
                "\nNote: found {} occurrences, replaced only the first. Use all_occurrences=true to replace all.",
                occurrences
            ));
        }

        Ok(ToolOutput::new(format!("Edit {}", args.path), output).with_metadata(json!({
            "replacements": replaced,
            "total_occurrences": occurrences,
            "backup": backup.map(|b| b.display().to_string()),
            "diff": diff
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_replace_first_occurrence() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "let x = 1;\nlet x = 1;\n").unwrap();

        let out = EditFileTool
            .execute(
                json!({"path": "a.rs", "old_content": "x = 1", "new_content": "x = 2"}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.output.contains("found 2 occurrences"));
        assert_eq!(
            fs::read_to_string(dir.path().join("a.rs")).unwrap(),
            "let x = 2;\nlet x = 1;\n"
        );
        assert_eq!(backup::list(&dir.path().join("a.rs")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_all() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "foo foo foo").unwrap();

        EditFileTool
            .execute(
                json!({
                    "path": "a.rs",
                    "old_content": "foo",
                    "new_content": "bar",
                    "all_occurrences": true,
                    "create_backup": false
                }),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.rs")).unwrap(), "bar bar bar");
        assert!(!dir.path().join(".backup").exists());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello\nworld\n").unwrap();

        let out = EditFileTool
            .execute(
                json!({"path": "a.txt", "old_content": "world", "new_content": "there", "dry_run": true}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.output.starts_with("DRY RUN"));
        assert!(out.output.contains("+there"));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_edit_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let ctx = testing::context(dir.path());

        let not_found = EditFileTool
            .execute(
                json!({"path": "a.txt", "old_content": "absent", "new_content": "x"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(not_found, ToolError::Validation(_)));

        let missing = EditFileTool
            .execute(
                json!({"path": "b.txt", "old_content": "a", "new_content": "b"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, ToolError::FileNotFound(_)));
    }
}
