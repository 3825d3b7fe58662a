//! Temporary project directories for tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary test project with configurable file structure.
///
/// The directory is removed when the built project is dropped.
///
/// # Example
///
/// ```rust
/// use amaya_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new()
///     .with_file("src/main.rs", "fn main() {}")
///     .with_dir("docs")
///     .build();
///
/// assert!(project.path().join("src/main.rs").exists());
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    files: BTreeMap<PathBuf, String>,
    dirs: Vec<PathBuf>,
}

impl TestProject {
    /// Create a new test project builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: BTreeMap::new(),
            dirs: Vec::new(),
        }
    }

    /// Add a file, relative to the project root.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    /// Add an empty directory.
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add a project configuration file.
    pub fn with_config(self, config: &str) -> Self {
        self.with_file("amaya.jsonc", config)
    }

    /// Add a .gitignore file.
    pub fn with_gitignore(self, contents: &str) -> Self {
        self.with_file(".gitignore", contents)
    }

    /// Create all files and directories.
    pub fn build(self) -> BuiltTestProject {
        let root = self.temp_dir.path();

        for dir in &self.dirs {
            let full_path = root.join(dir);
            fs::create_dir_all(&full_path).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", full_path.display(), e)
            });
        }

        for (path, contents) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!("Failed to create parent of {}: {}", full_path.display(), e)
                });
            }
            fs::write(&full_path, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
        }

        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        BuiltTestProject {
            temp_dir: self.temp_dir,
            root,
        }
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A built test project with its files on disk.
pub struct BuiltTestProject {
    temp_dir: TempDir,
    root: PathBuf,
}

impl BuiltTestProject {
    /// The canonical project root.
    ///
    /// On macOS the temp directory sits behind a symlink; this is the
    /// resolved path, which is what the path guard reports.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The temp directory as created.
    pub fn temp_dir(&self) -> &TempDir {
        &self.temp_dir
    }

    /// Read a file from the project.
    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.path().join(path.as_ref());
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    /// Check if a file exists in the project.
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.path().join(path.as_ref()).exists()
    }

    /// Write a file, creating parents.
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<str>) {
        let full_path = self.path().join(path.as_ref());
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&full_path, contents.as_ref())
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_creates_files_and_dirs() {
        let project = TestProject::new()
            .with_file("src/lib.rs", "pub fn a() {}")
            .with_dir("empty/nested")
            .with_config(r#"{ "provider": "gemini" }"#)
            .build();

        assert_eq!(project.read_file("src/lib.rs"), "pub fn a() {}");
        assert!(project.path().join("empty/nested").is_dir());
        assert!(project.file_exists("amaya.jsonc"));

        project.write_file("notes/todo.md", "- ship");
        assert_eq!(project.read_file("notes/todo.md"), "- ship");
    }
}
