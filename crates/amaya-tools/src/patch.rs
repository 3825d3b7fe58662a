//! Apply diff tool - apply unified diff hunks to one file.
//!
//! Hunks are anchored at the line named in their `@@ -a,b +c,d @@` header,
//! shifted by what earlier hunks added or removed. When the old lines are not
//! at that exact spot the nearest matching position is used instead, so a
//! header that is off by a few lines still applies.

use crate::backup;
use crate::write::{default_true, write_atomic};
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Files larger than this are refused.
const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

pub struct ApplyDiffTool;

#[derive(Debug, Deserialize)]
struct ApplyDiffArgs {
    path: String,
    diff: String,
    #[serde(default)]
    dry_run: bool,
    #[serde(default = "default_true")]
    create_backup: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Hunk {
    /// 1-based line in the original file; 0 for an insertion at the top.
    old_start: usize,
    lines: Vec<HunkLine>,
}

impl Hunk {
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    fn new_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.clone()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }
}

/// What applying a diff produced.
#[derive(Debug, PartialEq)]
struct Applied {
    content: String,
    added: usize,
    removed: usize,
    hunks: usize,
}

/// Parse `-10,3` / `+12` style ranges; returns the start line.
fn parse_range(range: &str, sign: char) -> Option<usize> {
    let range = range.strip_prefix(sign)?;
    let start = range.split(',').next()?;
    start.parse().ok()
}

fn parse_header(line: &str) -> HandlerResult<usize> {
    let mut parts = line.split_whitespace();
    let (Some("@@"), Some(old), Some(new)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ToolError::validation(format!("Malformed hunk header: {}", line)));
    };
    match (parse_range(old, '-'), parse_range(new, '+')) {
        (Some(old_start), Some(_)) => Ok(old_start),
        _ => Err(ToolError::validation(format!("Malformed hunk header: {}", line))),
    }
}

fn parse_hunks(diff: &str) -> HandlerResult<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();

    for line in diff.lines() {
        if line.starts_with("@@") {
            hunks.push(Hunk {
                old_start: parse_header(line)?,
                lines: Vec::new(),
            });
            continue;
        }
        // File headers and anything else before the first hunk.
        let Some(hunk) = hunks.last_mut() else {
            continue;
        };
        if line.starts_with('\\') {
            // "\ No newline at end of file"
            continue;
        }
        let parsed = match line.chars().next() {
            Some('+') => HunkLine::Add(line[1..].to_string()),
            Some('-') => HunkLine::Remove(line[1..].to_string()),
            Some(' ') => HunkLine::Context(line[1..].to_string()),
            None => HunkLine::Context(String::new()),
            Some(_) => {
                return Err(ToolError::validation(format!(
                    "Unexpected line in hunk (must start with ' ', '+' or '-'): {}",
                    line
                )))
            }
        };
        hunk.lines.push(parsed);
    }

    if hunks.is_empty() {
        return Err(ToolError::validation(
            "No hunks found. Each change must start with a '@@ -a,b +c,d @@' header.",
        ));
    }
    Ok(hunks)
}

fn matches_at(lines: &[String], at: usize, expected: &[&str]) -> bool {
    at + expected.len() <= lines.len()
        && lines[at..at + expected.len()]
            .iter()
            .zip(expected)
            .all(|(have, want)| have.trim_end() == want.trim_end())
}

/// Nearest position to `wanted` where `expected` matches.
fn locate(lines: &[String], wanted: usize, expected: &[&str]) -> Option<usize> {
    if expected.is_empty() {
        return Some(wanted.min(lines.len()));
    }
    if matches_at(lines, wanted, expected) {
        return Some(wanted);
    }
    (1..=lines.len()).find_map(|distance| {
        let before = wanted.checked_sub(distance);
        let after = wanted + distance;
        before
            .filter(|&at| matches_at(lines, at, expected))
            .or_else(|| Some(after).filter(|&at| matches_at(lines, at, expected)))
    })
}

fn apply(original: &str, diff: &str) -> HandlerResult<Applied> {
    let hunks = parse_hunks(diff)?;
    let trailing_newline = original.ends_with('\n') || original.is_empty();
    let mut lines: Vec<String> = original.lines().map(str::to_string).collect();
    let mut offset: isize = 0;
    let mut added = 0;
    let mut removed = 0;

    for (n, hunk) in hunks.iter().enumerate() {
        let expected = hunk.old_lines();
        let replacement = hunk.new_lines();
        let anchor = hunk.old_start.saturating_sub(1) as isize + offset;
        let wanted = anchor.max(0) as usize;

        let at = locate(&lines, wanted, &expected).ok_or_else(|| {
            ToolError::validation(format!(
                "Hunk {} does not apply: expected lines not found near line {}:\n{}",
                n + 1,
                wanted + 1,
                expected.join("\n")
            ))
        })?;

        added += hunk
            .lines
            .iter()
            .filter(|l| matches!(l, HunkLine::Add(_)))
            .count();
        removed += hunk
            .lines
            .iter()
            .filter(|l| matches!(l, HunkLine::Remove(_)))
            .count();

        offset += at as isize - anchor + replacement.len() as isize - expected.len() as isize;
        lines.splice(at..at + expected.len(), replacement);
    }

    let mut content = lines.join("\n");
    if trailing_newline && !content.is_empty() {
        content.push('\n');
    }
    Ok(Applied {
        content,
        added,
        removed,
        hunks: hunks.len(),
    })
}

#[async_trait]
impl Tool for ApplyDiffTool {
    fn id(&self) -> &str {
        "apply_diff"
    }

    fn description(&self) -> &str {
        r#"Apply a unified diff to a file. More precise than edit_file for multi-line changes.

Diff format:
@@ -10,3 +10,4 @@
 existing line
+new line added
 another line
-line to remove

- Lines starting with ' ' are context, '-' are removed, '+' are added
- Several hunks may follow each other; they are applied top to bottom
- dry_run reports the changes without writing"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path", "diff"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file to patch"
                },
                "diff": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Unified diff hunks"
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Preview without saving (default: false)"
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
        let args: ApplyDiffArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::file_not_found(&args.path))
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.len() > MAX_FILE_SIZE {
            return Err(ToolError::validation(format!(
                "File too large for diff application ({} bytes)",
                metadata.len()
            )));
        }

        let original = tokio::fs::read_to_string(&path).await?;
        let applied = apply(&original, &args.diff)?;

        if args.dry_run {
            return Ok(ToolOutput::new(
                format!("Apply diff to {} (dry run)", args.path),
                format!(
                    "DRY RUN - no changes made\nHunks: {}\nLines added: {}\nLines removed: {}",
                    applied.hunks, applied.added, applied.removed
                ),
            )
            .with_metadata(json!({
                "dry_run": true,
                "lines_added": applied.added,
                "lines_removed": applied.removed
            })));
        }

        let backup = if args.create_backup {
            backup::create(&path).await?
        } else {
            None
        };
        write_atomic(&path, &applied.content).await?;
        debug!(path = %path.display(), hunks = applied.hunks, "Applied diff");

        let mut output = format!(
            "Applied diff to {}\nLines added: {}\nLines removed: {}",
            args.path, applied.added, applied.removed
        );
        if let Some(backup) = &backup {
            output.push_str(&format!("\nBackup saved to: {}", backup.display()));
        }

        Ok(ToolOutput::new(format!("Apply diff to {}", args.path), output).with_metadata(json!({
            "hunks": applied.hunks,
            "lines_added": applied.added,
            "lines_removed": applied.removed,
            "backup": backup.map(|b| b.display().to_string())
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_apply_single_hunk() {
        let original = "a\nb\nc\nd\n";
        let diff = "--- a/f\n+++ b/f\n@@ -2,2 +2,3 @@\n b\n-c\n+C\n+c2\n";
        let applied = apply(original, diff).unwrap();
        assert_eq!(applied.content, "a\nb\nC\nc2\nd\n");
        assert_eq!((applied.added, applied.removed), (2, 1));
    }

    #[test]
    fn test_later_hunks_follow_earlier_shift() {
        let original: String = (1..=10).map(|i| format!("{i}\n")).collect();
        let diff = "@@ -1,2 +1,4 @@\n 1\n+1a\n+1b\n 2\n@@ -8,2 +10,1 @@\n 8\n-9\n";
        let applied = apply(&original, diff).unwrap();
        assert_eq!(applied.content, "1\n1a\n1b\n2\n3\n4\n5\n6\n7\n8\n10\n");
        assert_eq!(applied.hunks, 2);
    }

    #[test]
    fn test_header_off_by_a_few_lines_still_applies() {
        let original = "x\ny\nfn main() {\n    old();\n}\n";
        let diff = "@@ -1,3 +1,3 @@\n fn main() {\n-    old();\n+    new();\n }\n";
        let applied = apply(original, diff).unwrap();
        assert_eq!(applied.content, "x\ny\nfn main() {\n    new();\n}\n");
    }

    #[test]
    fn test_no_trailing_newline_preserved() {
        let applied = apply("one\ntwo", "@@ -2 +2 @@\n-two\n+three\n").unwrap();
        assert_eq!(applied.content, "one\nthree");
    }

    #[test]
    fn test_mismatch_and_malformed() {
        let err = apply("a\nb\n", "@@ -1,1 +1,1 @@\n-zzz\n+y\n").unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
        assert!(err.to_string().contains("Hunk 1 does not apply"));

        assert!(apply("a\n", "just text").is_err());
        assert!(apply("a\n", "@@ nonsense @@\n").is_err());
        assert!(apply("a\n", "@@ -1 +1 @@\n*a\n").is_err());
    }

    #[tokio::test]
    async fn test_tool_writes_and_backs_up() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "a\nb\n").unwrap();
        let ctx = testing::context(dir.path());

        let preview = ApplyDiffTool
            .execute(
                json!({"path": "f.txt", "diff": "@@ -1,2 +1,2 @@\n a\n-b\n+B\n", "dry_run": true}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(preview.output.starts_with("DRY RUN"));
        assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nb\n");

        let out = ApplyDiffTool
            .execute(
                json!({"path": "f.txt", "diff": "@@ -1,2 +1,2 @@\n a\n-b\n+B\n"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.output.contains("Lines added: 1"));
        assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nB\n");
        assert_eq!(backup::list(&dir.path().join("f.txt")).await.unwrap().len(), 1);
    }
}
