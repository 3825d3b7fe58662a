//! File lookup for the search tools.
//!
//! `find_files` and `search_files` go through a [`FileIndex`] rather than
//! walking the disk themselves, so a host with a real index can plug one
//! in. [`WorkspaceIndex`] is the bundled implementation: a fresh walk of
//! the tree on every query, honouring `.gitignore`.

use crate::{HandlerResult, ToolError};
use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use ignore::WalkBuilder;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories never searched.
const SKIPPED_DIRS: &[&str] = &[".git", ".backup", "node_modules", "target"];

/// Lines longer than this are cut in content results.
const MAX_LINE_CHARS: usize = 500;

/// A search request.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Files whose path relative to `root` matches a glob.
    Name {
        pattern: String,
        root: PathBuf,
        limit: usize,
    },
    /// Lines matching a regex, optionally only in files matching `include`.
    Content {
        pattern: String,
        root: PathBuf,
        include: Option<String>,
        limit: usize,
    },
}

/// One hit. Content hits carry the 1-based line number and the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatch {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub text: Option<String>,
}

#[async_trait]
pub trait FileIndex: Send + Sync {
    /// Run a query. Returns at most the query's limit of matches.
    async fn search(&self, query: IndexQuery) -> HandlerResult<Vec<FileMatch>>;
}

/// Walks the workspace on every query.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceIndex;

#[async_trait]
impl FileIndex for WorkspaceIndex {
    async fn search(&self, query: IndexQuery) -> HandlerResult<Vec<FileMatch>> {
        tokio::task::spawn_blocking(move || match query {
            IndexQuery::Name {
                pattern,
                root,
                limit,
            } => find_by_name(&pattern, &root, limit),
            IndexQuery::Content {
                pattern,
                root,
                include,
                limit,
            } => search_content(&pattern, &root, include.as_deref(), limit),
        })
        .await
        .map_err(|e| ToolError::execution_failed(format!("Search task failed: {e}")))?
    }
}

fn walk(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !SKIPPED_DIRS.contains(&name.as_ref())
        })
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
}

fn compile_glob(pattern: &str) -> HandlerResult<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| ToolError::validation(format!("Invalid glob pattern '{}': {}", pattern, e)))
}

/// Match against the relative path, and the bare file name for patterns
/// without a separator (`*.rs` finds `src/main.rs`).
fn glob_matches(pattern: &Pattern, relative: &Path) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    if pattern.matches_path_with(relative, options) {
        return true;
    }
    !pattern.as_str().contains('/')
        && relative
            .file_name()
            .is_some_and(|name| pattern.matches_with(&name.to_string_lossy(), options))
}

fn find_by_name(pattern: &str, root: &Path, limit: usize) -> HandlerResult<Vec<FileMatch>> {
    let glob = compile_glob(pattern)?;
    debug!(pattern = %pattern, root = %root.display(), "Finding files");

    Ok(walk(root)
        .filter(|path| {
            path.strip_prefix(root)
                .map(|rel| glob_matches(&glob, rel))
                .unwrap_or(false)
        })
        .take(limit)
        .map(|path| FileMatch {
            path,
            line: None,
            text: None,
        })
        .collect())
}

fn search_content(
    pattern: &str,
    root: &Path,
    include: Option<&str>,
    limit: usize,
) -> HandlerResult<Vec<FileMatch>> {
    let regex = Regex::new(pattern)
        .map_err(|e| ToolError::validation(format!("Invalid regex '{}': {}", pattern, e)))?;
    let include = include.map(compile_glob).transpose()?;
    debug!(pattern = %pattern, root = %root.display(), "Searching file contents");

    let mut matches = Vec::new();
    for path in walk(root) {
        if let Some(include) = &include {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if !glob_matches(include, rel) {
                continue;
            }
        }

        // Unreadable and binary files are skipped.
        let Ok(file) = File::open(&path) else {
            continue;
        };
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let Ok(line) = line else {
                break;
            };
            if regex.is_match(&line) {
                matches.push(FileMatch {
                    path: path.clone(),
                    line: Some(number + 1),
                    text: Some(line.chars().take(MAX_LINE_CHARS).collect()),
                });
                if matches.len() >= limit {
                    return Ok(matches);
                }
            }
        }
    }
    Ok(matches)
}
