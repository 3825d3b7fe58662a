//! List tool - directory listing.

use crate::file_ops::format_size;
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Maximum number of entries to list.
const LIMIT: usize = 500;

/// Depth used for recursive listings when none is given.
const DEFAULT_MAX_DEPTH: usize = 3;

/// List files and directories.
pub struct ListFilesTool;

#[derive(Debug, Deserialize)]
struct ListArgs {
    path: String,
    #[serde(default)]
    recursive: bool,
    max_depth: Option<usize>,
    #[serde(default)]
    include_hidden: bool,
    pattern: Option<String>,
}

struct Entry {
    relative: PathBuf,
    is_dir: bool,
    size: u64,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn id(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        r#"List files and directories in the specified path.

- path is absolute or relative to the workspace root
- recursive descends into subdirectories, up to max_depth levels (default 3)
- pattern is a regex that entry names must match
- hidden entries are skipped unless include_hidden is true"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Descend into subdirectories (default: false)"
                },
                "max_depth": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum depth when recursive (default: 3)"
                },
                "include_hidden": {
                    "type": "boolean",
                    "description": "Include hidden files (default: false)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Regex that entry names must match"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: ListArgs = parse_args(args)?;
        let dir = ctx.resolve_path(&args.path)?;

        if !dir.exists() {
            return Err(ToolError::file_not_found(&args.path));
        }
        if !dir.is_dir() {
            return Err(ToolError::validation(format!(
                "Path is not a directory: {}",
                args.path
            )));
        }

        let pattern = args
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ToolError::validation(format!("Invalid pattern: {e}")))?;
        let depth = if args.recursive {
            args.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
        } else {
            1
        };

        let walk_dir = dir.clone();
        let include_hidden = args.include_hidden;
        let (entries, truncated) = tokio::task::spawn_blocking(move || {
            collect_entries(&walk_dir, depth, include_hidden, pattern.as_ref())
        })
        .await
        .map_err(|e| ToolError::execution_failed(format!("Listing task failed: {e}")))?;

        let mut output = format!("Directory: {}\nTotal: {} items\n\n", dir.display(), entries.len());
        for entry in &entries {
            if entry.is_dir {
                output.push_str(&format!("{}/\n", entry.relative.display()));
            } else {
                output.push_str(&format!(
                    "{} ({})\n",
                    entry.relative.display(),
                    format_size(entry.size)
                ));
            }
        }
        if truncated {
            output.push_str(&format!(
                "\n(Showing first {LIMIT} entries. Use a more specific path or pattern.)\n"
            ));
        }

        Ok(ToolOutput::new(dir.display().to_string(), output).with_metadata(json!({
            "count": entries.len(),
            "truncated": truncated
        })))
    }
}

fn collect_entries(
    dir: &Path,
    depth: usize,
    include_hidden: bool,
    pattern: Option<&Regex>,
) -> (Vec<Entry>, bool) {
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .hidden(!include_hidden)
        .max_depth(Some(depth))
        .follow_links(false)
        .build();

    let mut entries = Vec::new();
    let mut truncated = false;
    for entry in walker.filter_map(Result::ok) {
        if entry.depth() == 0 {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if pattern.is_some_and(|p| !p.is_match(&name)) {
            continue;
        }
        if entries.len() >= LIMIT {
            truncated = true;
            break;
        }
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        let size = if is_dir {
            0
        } else {
            entry.metadata().map(|m| m.len()).unwrap_or(0)
        };
        entries.push(Entry {
            relative: entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_path_buf(),
            is_dir,
            size,
        });
    }

    // Directories first, then by path.
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then(a.relative.cmp(&b.relative)));
    (entries, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/deep/deeper/deepest")).unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn x() {}").unwrap();
        fs::write(dir.path().join("src/deep/deeper/deepest/far.rs"), "").unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_list_top_level() {
        let dir = project();
        let out = ListFilesTool
            .execute(json!({"path": "."}), &testing::context(dir.path()))
            .await
            .unwrap();
        assert!(out.output.contains("Total: 2 items"));
        assert!(out.output.contains("src/\n"));
        assert!(out.output.contains("Cargo.toml (9 B)"));
        assert!(!out.output.contains(".env"));
        assert!(!out.output.contains("lib.rs"));
    }

    #[tokio::test]
    async fn test_list_recursive_depth_and_hidden() {
        let dir = project();
        let ctx = testing::context(dir.path());

        let out = ListFilesTool
            .execute(json!({"path": ".", "recursive": true}), &ctx)
            .await
            .unwrap();
        assert!(out.output.contains("lib.rs"));
        assert!(out.output.contains("deeper/"));
        assert!(!out.output.contains("deepest"));

        let out = ListFilesTool
            .execute(
                json!({"path": ".", "recursive": true, "max_depth": 5, "include_hidden": true}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.output.contains("far.rs"));
        assert!(out.output.contains(".env"));
    }

    #[tokio::test]
    async fn test_list_pattern() {
        let dir = project();
        let out = ListFilesTool
            .execute(
                json!({"path": "src", "pattern": r"\.rs$"}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(out.metadata["count"], 1);
        assert!(out.output.contains("lib.rs"));
    }

    #[tokio::test]
    async fn test_list_errors() {
        let dir = project();
        let ctx = testing::context(dir.path());

        let outside = ListFilesTool
            .execute(json!({"path": "/etc"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(outside, ToolError::PermissionDenied(_)));

        let missing = ListFilesTool
            .execute(json!({"path": "nope"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(missing, ToolError::FileNotFound(_)));

        let file = ListFilesTool
            .execute(json!({"path": "Cargo.toml"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(file, ToolError::Validation(_)));
    }
}
