//! Read tool - read file contents.

use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

/// Maximum file size to read (10MB).
pub(crate) const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Lines returned when no limit is given.
pub(crate) const DEFAULT_LIMIT: usize = 2000;

/// Longest line shown before it is cut.
const MAX_LINE_CHARS: usize = 2000;

/// How much of the file is sniffed for NUL bytes.
const BINARY_SAMPLE: usize = 8192;

/// A file rendered for the model.
pub(crate) struct FileText {
    pub output: String,
    pub lines: usize,
    pub total_lines: usize,
    pub binary: bool,
    pub size: u64,
}

/// Read a text file with line numbers.
///
/// `offset` is the number of lines to skip.
pub(crate) async fn read_numbered(
    path: &Path,
    shown: &str,
    offset: usize,
    limit: usize,
) -> HandlerResult<FileText> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::file_not_found(shown))
        }
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        return Err(ToolError::validation(format!(
            "{} is a directory; use list_files",
            shown
        )));
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(ToolError::validation(format!(
            "File too large ({} bytes). Maximum allowed size is {} bytes.",
            metadata.len(),
            MAX_FILE_SIZE
        )));
    }

    let bytes = tokio::fs::read(path).await?;
    let sample = &bytes[..bytes.len().min(BINARY_SAMPLE)];
    if sample.contains(&0) {
        return Ok(FileText {
            output: format!(
                "[Binary file: {} bytes]\n\nThis file appears to be binary and cannot be displayed as text.",
                bytes.len()
            ),
            lines: 0,
            total_lines: 0,
            binary: true,
            size: metadata.len(),
        });
    }

    let content = String::from_utf8_lossy(&bytes);
    let total_lines = content.lines().count();
    let mut output = content
        .lines()
        .skip(offset)
        .take(limit)
        .enumerate()
        .map(|(i, line)| {
            let line = if line.chars().count() > MAX_LINE_CHARS {
                let cut: String = line.chars().take(MAX_LINE_CHARS).collect();
                format!("{}... [truncated]", cut)
            } else {
                line.to_string()
            };
            format!("{:5}|\t{}", offset + i + 1, line)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let lines = total_lines.saturating_sub(offset).min(limit);
    let end = offset + lines;
    if end < total_lines {
        output.push_str(&format!(
            "\n\n(Showing lines {}-{} of {}. Use offset {} to read further.)",
            offset + 1,
            end,
            total_lines,
            end
        ));
    }

    Ok(FileText {
        output,
        lines,
        total_lines,
        binary: false,
        size: metadata.len(),
    })
}

/// Read file contents with line numbers.
pub struct ReadFileTool;

#[derive(Debug, Deserialize)]
struct ReadArgs {
    path: String,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn id(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        r#"Reads a file from the workspace.

Usage:
- path is absolute or relative to the workspace root
- By default, reads up to 2000 lines from the beginning of the file
- offset skips that many lines; limit caps the number of lines returned
- Lines longer than 2000 characters are truncated
- Results are returned with line numbers starting at 1
- Binary files are detected and not displayed"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file to read"
                },
                "offset": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Number of lines to skip"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of lines to read (default: 2000)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: ReadArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT);

        let text = read_numbered(&path, &args.path, args.offset, limit).await?;

        Ok(
            ToolOutput::new(format!("Read {}", path.display()), text.output).with_metadata(json!({
                "lines": text.lines,
                "total_lines": text.total_lines,
                "offset": args.offset,
                "binary": text.binary,
                "size": text.size,
                "path": path.display().to_string()
            })),
        )
    }
}
