//! Find tool - locate files by glob pattern.

use crate::index::{FileIndex, IndexQuery};
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use amaya_util::path::relative_to;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

/// Matches returned when no limit is given.
pub(crate) const DEFAULT_LIMIT: usize = 100;

/// Shown relative to the workspace root when possible.
pub(crate) fn display_path(path: &Path, root: &Path) -> String {
    relative_to(path, root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Find files by glob pattern.
pub struct FindFilesTool {
    index: Arc<dyn FileIndex>,
}

impl FindFilesTool {
    pub fn new(index: Arc<dyn FileIndex>) -> Self {
        Self { index }
    }
}

#[derive(Debug, Deserialize)]
struct FindArgs {
    pattern: String,
    path: Option<String>,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for FindFilesTool {
    fn id(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        r#"Find files by name pattern.

- Supports glob patterns like "*.rs", "**/*.toml" or "src/**/mod.rs"
- Patterns without '/' match the file name anywhere in the tree
- .gitignore'd files, hidden files and .backup directories are skipped"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The glob pattern to match files against"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (default: workspace root)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of results (default: 100)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: FindArgs = parse_args(args)?;
        let root = ctx.resolve_path(args.path.as_deref().unwrap_or("."))?;
        if !root.is_dir() {
            return Err(ToolError::validation(format!(
                "Not a directory: {}",
                root.display()
            )));
        }
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT);

        let query = IndexQuery::Name {
            pattern: args.pattern.clone(),
            root,
            limit: limit + 1,
        };
        let mut matches = tokio::select! {
            result = self.index.search(query) => result?,
            _ = ctx.abort.cancelled() => return Err(ToolError::Cancelled),
        };

        let truncated = matches.len() > limit;
        matches.truncate(limit);

        let mut output = if matches.is_empty() {
            "No files found".to_string()
        } else {
            matches
                .iter()
                .map(|m| display_path(&m.path, &ctx.root_dir))
                .collect::<Vec<_>>()
                .join("\n")
        };
        if truncated {
            output.push_str(&format!(
                "\n\n(Results are truncated at {limit}. Use a more specific pattern.)"
            ));
        }

        Ok(ToolOutput::new(
            format!("Find: {} ({} files)", args.pattern, matches.len()),
            output,
        )
        .with_metadata(json!({ "count": matches.len(), "truncated": truncated })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FileMatch, WorkspaceIndex};
    use crate::testing;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct PendingIndex;

    #[async_trait]
    impl FileIndex for PendingIndex {
        async fn search(&self, _query: IndexQuery) -> HandlerResult<Vec<FileMatch>> {
            futures::future::pending().await
        }
    }

    struct FixedIndex(Vec<PathBuf>);

    #[async_trait]
    impl FileIndex for FixedIndex {
        async fn search(&self, query: IndexQuery) -> HandlerResult<Vec<FileMatch>> {
            let IndexQuery::Name { limit, .. } = query else {
                panic!("expected a name query");
            };
            Ok(self
                .0
                .iter()
                .take(limit)
                .map(|p| FileMatch {
                    path: p.clone(),
                    line: None,
                    text: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_find_relative_output() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/bin")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        fs::write(dir.path().join("src/bin/cli.rs"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let tool = FindFilesTool::new(Arc::new(WorkspaceIndex));
        let out = tool
            .execute(json!({"pattern": "*.rs"}), &testing::context(dir.path()))
            .await
            .unwrap();
        assert_eq!(out.output, "src/bin/cli.rs\nsrc/lib.rs");
        assert_eq!(out.metadata["count"], 2);
    }

    #[tokio::test]
    async fn test_find_truncates() {
        let dir = tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let paths = (0..5).map(|i| ctx.root_dir.join(format!("{i}.txt"))).collect();
        let tool = FindFilesTool::new(Arc::new(FixedIndex(paths)));

        let out = tool
            .execute(json!({"pattern": "*.txt", "limit": 3}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.metadata["count"], 3);
        assert_eq!(out.metadata["truncated"], true);
        assert!(out.output.contains("truncated at 3"));
    }

    #[tokio::test]
    async fn test_find_cancelled() {
        let dir = tempdir().unwrap();
        let ctx = testing::context(dir.path());
        ctx.abort.cancel();
        let tool = FindFilesTool::new(Arc::new(PendingIndex));
        let err = tool
            .execute(json!({"pattern": "*"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }

    #[tokio::test]
    async fn test_find_outside_root() {
        let dir = tempdir().unwrap();
        let tool = FindFilesTool::new(Arc::new(WorkspaceIndex));
        let err = tool
            .execute(
                json!({"pattern": "*", "path": "/"}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }
}
