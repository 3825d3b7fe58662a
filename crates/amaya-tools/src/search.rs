//! Search tool - regex search over file contents.

use crate::find::display_path;
use crate::index::{FileIndex, IndexQuery};
use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 100;

/// Search file contents with a regex.
pub struct SearchFilesTool {
    index: Arc<dyn FileIndex>,
}

impl SearchFilesTool {
    pub fn new(index: Arc<dyn FileIndex>) -> Self {
        Self { index }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    pattern: String,
    path: Option<String>,
    include: Option<String>,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn id(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        r#"Search file contents using regular expressions.

- Supports full regex syntax (e.g. "log.*Error", "fn\s+\w+")
- Filter files with include (e.g. "*.rs", "src/**/*.ts")
- Returns file paths with line numbers and the matching line"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (default: workspace root)"
                },
                "include": {
                    "type": "string",
                    "description": "Glob that file paths must match"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of matching lines (default: 100)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: SearchArgs = parse_args(args)?;
        let root = ctx.resolve_path(args.path.as_deref().unwrap_or("."))?;
        if !root.is_dir() {
            return Err(ToolError::validation(format!(
                "Not a directory: {}",
                root.display()
            )));
        }
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT);

        let query = IndexQuery::Content {
            pattern: args.pattern.clone(),
            root,
            include: args.include.clone(),
            limit: limit + 1,
        };
        let mut matches = tokio::select! {
            result = self.index.search(query) => result?,
            _ = ctx.abort.cancelled() => return Err(ToolError::Cancelled),
        };

        let truncated = matches.len() > limit;
        matches.truncate(limit);

        if matches.is_empty() {
            return Ok(ToolOutput::new(
                format!("Search: {}", args.pattern),
                "No matches found",
            )
            .with_metadata(json!({ "matches": 0, "truncated": false })));
        }

        // Group by file, keeping the index's order.
        let mut output = String::new();
        let mut current: Option<&std::path::Path> = None;
        let mut files = 0;
        for m in &matches {
            if current != Some(m.path.as_path()) {
                if current.is_some() {
                    output.push('\n');
                }
                output.push_str(&format!("{}:\n", display_path(&m.path, &ctx.root_dir)));
                current = Some(m.path.as_path());
                files += 1;
            }
            output.push_str(&format!(
                "  Line {}: {}\n",
                m.line.unwrap_or(0),
                m.text.as_deref().unwrap_or("").trim()
            ));
        }
        if truncated {
            output.push_str(&format!(
                "\n(Results are truncated at {limit}. Use a more specific pattern or path.)\n"
            ));
        }

        Ok(ToolOutput::new(
            format!("Search: {} ({} matches)", args.pattern, matches.len()),
            output.trim_end().to_string(),
        )
        .with_metadata(json!({
            "matches": matches.len(),
            "files": files,
            "truncated": truncated
        })))
    }
}
