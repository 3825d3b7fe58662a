//! Directory and file management tools.

use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Human-readable size: `9 B`, `1.5 KB`, `3.0 MB`.
pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

async fn require_exists(path: &Path, shown: &str) -> HandlerResult<std::fs::Metadata> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(metadata),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::file_not_found(shown)),
        Err(e) => Err(e.into()),
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> std::io::Result<u64> {
    std::fs::create_dir_all(to)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "required": ["path"],
        "properties": {
            "path": { "type": "string", "description": description }
        }
    })
}

/// Create a directory and any missing parents.
pub struct CreateDirectoryTool;

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn id(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a directory, including any missing parent directories. Succeeds if it already exists."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Directory to create")
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemWrite
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: PathArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;

        if path.is_file() {
            return Err(ToolError::validation(format!(
                "A file already exists at {}",
                args.path
            )));
        }
        let existed = path.is_dir();
        fs::create_dir_all(&path).await?;

        let output = if existed {
            format!("Directory already exists: {}", args.path)
        } else {
            format!("Created directory: {}", args.path)
        };
        Ok(ToolOutput::new(format!("mkdir {}", args.path), output)
            .with_metadata(json!({ "path": path.display().to_string(), "created": !existed })))
    }
}

/// Delete a file, or a directory when `recursive` is set.
pub struct DeleteFileTool;

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    path: String,
    #[serde(default)]
    recursive: bool,
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn id(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        r#"Delete a file or directory.

- Directories are only deleted when recursive is true
- The workspace root itself cannot be deleted
- Deleted files are not backed up"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": { "type": "string", "description": "File or directory to delete" },
                "recursive": {
                    "type": "boolean",
                    "description": "Required to delete a directory and its contents (default: false)"
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemWrite
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: DeleteArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;

        if ctx.guard.roots().iter().any(|root| root == &path) {
            return Err(ToolError::permission_denied(
                "Refusing to delete an allowed root directory",
            ));
        }

        let metadata = require_exists(&path, &args.path).await?;
        if metadata.is_dir() {
            if !args.recursive {
                return Err(ToolError::validation(format!(
                    "{} is a directory. Set recursive=true to delete it and its contents.",
                    args.path
                )));
            }
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        debug!(path = %path.display(), "Deleted");

        Ok(ToolOutput::new(
            format!("Delete {}", args.path),
            format!("Deleted: {}", args.path),
        )
        .with_metadata(json!({ "path": path.display().to_string(), "directory": metadata.is_dir() })))
    }
}

#[derive(Debug, Deserialize)]
struct TransferArgs {
    source: String,
    destination: String,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Copy,
    Move,
}

fn transfer_schema(verb: &str) -> Value {
    json!({
        "type": "object",
        "required": ["source", "destination"],
        "properties": {
            "source": { "type": "string", "description": format!("File or directory to {}", verb) },
            "destination": { "type": "string", "description": "Target path" },
            "overwrite": {
                "type": "boolean",
                "description": "Replace an existing destination (default: false)"
            }
        }
    })
}

async fn transfer(args: Value, ctx: &ToolContext, mode: Mode) -> HandlerResult<ToolOutput> {
    let args: TransferArgs = parse_args(args)?;
    let source = ctx.resolve_path(&args.source)?;
    let destination = ctx.resolve_path(&args.destination)?;

    let metadata = require_exists(&source, &args.source).await?;
    if source == destination {
        return Err(ToolError::validation("source and destination are the same"));
    }
    if metadata.is_dir() && destination.starts_with(&source) {
        return Err(ToolError::validation(
            "Cannot copy or move a directory into itself",
        ));
    }
    if fs::try_exists(&destination).await.unwrap_or(false) {
        if !args.overwrite {
            return Err(ToolError::validation(format!(
                "Destination already exists: {}. Use overwrite=true to replace.",
                args.destination
            )));
        }
        if destination.is_dir() {
            fs::remove_dir_all(&destination).await?;
        } else {
            fs::remove_file(&destination).await?;
        }
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }

    let copy = |from: PathBuf, to: PathBuf, is_dir: bool| async move {
        if is_dir {
            tokio::task::spawn_blocking(move || copy_dir_all(&from, &to))
                .await
                .map_err(|e| ToolError::execution_failed(format!("Copy task failed: {e}")))?
                .map_err(ToolError::from)
        } else {
            fs::copy(&from, &to).await.map(|_| 1).map_err(ToolError::from)
        }
    };

    let verb = match mode {
        Mode::Copy => {
            copy(source.clone(), destination.clone(), metadata.is_dir()).await?;
            "Copied"
        }
        Mode::Move => {
            // rename fails across filesystems; fall back to copy and delete.
            if fs::rename(&source, &destination).await.is_err() {
                copy(source.clone(), destination.clone(), metadata.is_dir()).await?;
                if metadata.is_dir() {
                    fs::remove_dir_all(&source).await?;
                } else {
                    fs::remove_file(&source).await?;
                }
            }
            "Moved"
        }
    };
    debug!(source = %source.display(), destination = %destination.display(), verb, "Transferred");

    Ok(ToolOutput::new(
        format!("{} {}", verb, args.source),
        format!("{}: {} -> {}", verb, args.source, args.destination),
    )
    .with_metadata(json!({
        "source": source.display().to_string(),
        "destination": destination.display().to_string(),
        "directory": metadata.is_dir()
    })))
}

/// Copy a file or directory.
pub struct CopyFileTool;

#[async_trait]
impl Tool for CopyFileTool {
    fn id(&self) -> &str {
        "copy_file"
    }

    fn description(&self) -> &str {
        "Copy a file or directory to a new location. Parent directories are created; an existing destination is only replaced with overwrite=true."
    }

    fn parameters_schema(&self) -> Value {
        transfer_schema("copy")
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemWrite
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        transfer(args, ctx, Mode::Copy).await
    }
}

/// Move or rename a file or directory.
pub struct MoveFileTool;

#[async_trait]
impl Tool for MoveFileTool {
    fn id(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file or directory. Parent directories are created; an existing destination is only replaced with overwrite=true."
    }

    fn parameters_schema(&self) -> Value {
        transfer_schema("move")
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemWrite
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        transfer(args, ctx, Mode::Move).await
    }
}

/// Size, type, timestamps and permissions of a path.
pub struct GetFileInfoTool;

#[async_trait]
impl Tool for GetFileInfoTool {
    fn id(&self) -> &str {
        "get_file_info"
    }

    fn description(&self) -> &str {
        "Get information about a file or directory: type, size, modification time, permissions and, for directories, the number of entries."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("File or directory to inspect")
    }

    fn capability(&self) -> Capability {
        Capability::FilesystemRead
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: PathArgs = parse_args(args)?;
        let path = ctx.resolve_path(&args.path)?;
        let metadata = require_exists(&path, &args.path).await?;

        let kind = if metadata.is_dir() {
            "directory"
        } else if metadata.is_file() {
            "file"
        } else if metadata.file_type().is_symlink() {
            "symlink"
        } else {
            "other"
        };
        let modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string());
        let readonly = metadata.permissions().readonly();

        let mut output = format!(
            "Path: {}\nType: {}\nSize: {}\n",
            path.display(),
            kind,
            format_size(metadata.len())
        );
        if let Some(modified) = &modified {
            output.push_str(&format!("Modified: {}\n", modified));
        }
        if metadata.is_file() {
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "(none)".to_string());
            output.push_str(&format!("Extension: {}\n", extension));
        }
        output.push_str(&format!(
            "Permissions: {}\n",
            if readonly { "read-only" } else { "read-write" }
        ));

        let mut children = None;
        if metadata.is_dir() {
            let mut entries = fs::read_dir(&path).await?;
            let mut count = 0usize;
            while entries.next_entry().await?.is_some() {
                count += 1;
            }
            output.push_str(&format!("Children: {} items\n", count));
            children = Some(count);
        }

        Ok(ToolOutput::new(format!("Info {}", args.path), output).with_metadata(json!({
            "path": path.display().to_string(),
            "type": kind,
            "size": metadata.len(),
            "modified": modified,
            "readonly": readonly,
            "children": children
        })))
    }
}
