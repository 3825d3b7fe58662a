//! Backups taken before a file is overwritten.
//!
//! `<dir>/.backup/<name>.bak.<unix_millis>`, newest restored first.

use crate::{HandlerResult, ToolError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub(crate) const BACKUP_DIR: &str = ".backup";

fn backup_dir(path: &Path) -> PathBuf {
    path.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(BACKUP_DIR)
}

fn file_name(path: &Path) -> HandlerResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ToolError::validation(format!("Not a file path: {}", path.display())))
}

/// Copy the current content of `path` aside. Returns `None` when there is
/// nothing to back up.
pub(crate) async fn create(path: &Path) -> HandlerResult<Option<PathBuf>> {
    if !fs::try_exists(path).await.unwrap_or(false) || path.is_dir() {
        return Ok(None);
    }

    let dir = backup_dir(path);
    fs::create_dir_all(&dir).await?;
    let name = file_name(path)?;

    // Two writes in the same millisecond must not share a backup.
    let mut stamp = chrono::Utc::now().timestamp_millis();
    let mut target = dir.join(format!("{}.bak.{}", name, stamp));
    while fs::try_exists(&target).await.unwrap_or(false) {
        stamp += 1;
        target = dir.join(format!("{}.bak.{}", name, stamp));
    }

    fs::copy(path, &target).await?;
    debug!(path = %path.display(), backup = %target.display(), "Created backup");
    Ok(Some(target))
}

/// Backups of `path`, newest first.
pub(crate) async fn list(path: &Path) -> HandlerResult<Vec<PathBuf>> {
    let dir = backup_dir(path);
    let prefix = format!("{}.bak.", file_name(path)?);

    let mut entries = match fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found: Vec<(i64, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stamp) = name
            .strip_prefix(&prefix)
            .and_then(|s| s.parse::<i64>().ok())
        {
            found.push((stamp, entry.path()));
        }
    }
    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_and_list() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");

        assert!(create(&file).await.unwrap().is_none());

        std::fs::write(&file, "v1").unwrap();
        let first = create(&file).await.unwrap().unwrap();
        std::fs::write(&file, "v2").unwrap();
        let second = create(&file).await.unwrap().unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with(dir.path().join(BACKUP_DIR)));

        let backups = list(&file).await.unwrap();
        assert_eq!(backups, vec![second.clone(), first]);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "v2");

        // A different file with a common prefix is not mixed in.
        std::fs::write(dir.path().join("notes.txt.old"), "x").unwrap();
        create(&dir.path().join("notes.txt.old")).await.unwrap();
        assert_eq!(list(&file).await.unwrap().len(), 2);
    }
}
