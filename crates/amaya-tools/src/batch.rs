//! Batch read tool - read several files in one call.

use crate::read::read_numbered;
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

/// Maximum number of files per call.
const MAX_FILES: usize = 20;

/// Lines per file when no limit is given.
const DEFAULT_LINES_PER_FILE: usize = 100;

pub struct BatchReadTool;

#[derive(Debug, Deserialize)]
struct BatchArgs {
    paths: Vec<String>,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for BatchReadTool {
    fn id(&self) -> &str {
        "batch_read"
    }

    fn description(&self) -> &str {
        r#"Read multiple files in a single call.

- paths: up to 20 files
- limit: maximum lines per file (default: 100)
- A file that cannot be read is reported inline; the others are still returned"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["paths"],
            "properties": {
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": MAX_FILES,
                    "description": "Files to read"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum lines per file (default: 100)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: BatchArgs = parse_args(args)?;
        if args.paths.is_empty() || args.paths.len() > MAX_FILES {
            return Err(ToolError::validation(format!(
                "paths must contain between 1 and {} files",
                MAX_FILES
            )));
        }
        let limit = args.limit.unwrap_or(DEFAULT_LINES_PER_FILE);

        // Every path is checked before anything is read.
        let resolved = args
            .paths
            .iter()
            .map(|p| ctx.resolve_path(p))
            .collect::<HandlerResult<Vec<_>>>()?;

        let reads = join_all(
            resolved
                .iter()
                .zip(&args.paths)
                .map(|(path, shown)| read_numbered(path, shown, 0, limit)),
        )
        .await;

        let mut output = String::new();
        let mut failed = 0;
        for (shown, read) in args.paths.iter().zip(reads) {
            output.push_str(&format!("=== {} ===\n", shown));
            match read {
                Ok(text) => output.push_str(&text.output),
                Err(e) => {
                    failed += 1;
                    output.push_str(&format!("[ERROR] {}", e));
                }
            }
            output.push_str("\n\n");
        }

        Ok(ToolOutput::new(
            format!("Read {} files", args.paths.len()),
            output.trim_end().to_string(),
        )
        .with_metadata(json!({ "files": args.paths.len(), "failed": failed })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_batch_read_keeps_order_and_reports_failures() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "first").unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();

        let out = BatchReadTool
            .execute(
                json!({"paths": ["b.txt", "missing.txt", "a.txt"]}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();

        let b = out.output.find("=== b.txt ===").unwrap();
        let missing = out.output.find("=== missing.txt ===").unwrap();
        let a = out.output.find("=== a.txt ===").unwrap();
        assert!(b < missing && missing < a);
        assert!(out.output.contains("[ERROR] File not found: missing.txt"));
        assert!(out.output.contains("    1|\tsecond"));
        assert_eq!(out.metadata["failed"], 1);
    }

    #[tokio::test]
    async fn test_batch_read_limit() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("long.txt"), "1\n2\n3\n4\n").unwrap();
        let out = BatchReadTool
            .execute(
                json!({"paths": ["long.txt"], "limit": 2}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.output.contains("    2|\t2"));
        assert!(!out.output.contains("    3|\t3"));
    }

    #[tokio::test]
    async fn test_batch_read_denies_whole_call() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "first").unwrap();
        let err = BatchReadTool
            .execute(
                json!({"paths": ["a.txt", "/etc/hostname"]}),
                &testing::context(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }
}
