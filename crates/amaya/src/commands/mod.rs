//! Command handlers for the amaya CLI.

pub mod config;
pub mod logging;
pub mod run;
pub mod tools;

use amaya_core::{AgentSettings, ConfigFile};
use amaya_provider::ProviderKind;
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};

/// Flags that override the loaded configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Provider to use (anthropic, openai, gemini)
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    /// Model ID to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Project directory; also the only allowed root unless configured
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Maximum model calls per turn
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

impl SettingsArgs {
    /// The project directory these flags select.
    pub fn project_dir(&self, cwd: &Path) -> PathBuf {
        match &self.root {
            Some(root) => amaya_util::path::resolve(root, cwd),
            None => cwd.to_path_buf(),
        }
    }

    fn overrides(&self, project_dir: &Path) -> ConfigFile {
        ConfigFile {
            provider: self.provider,
            model: self.model.clone(),
            max_loop_iterations: self.max_iterations,
            allowed_roots: self.root.as_ref().map(|_| vec![project_dir.to_path_buf()]),
            ..ConfigFile::default()
        }
    }
}

/// Load settings for `cwd` with command-line overrides applied last.
pub async fn load_settings(
    cwd: &Path,
    args: &SettingsArgs,
) -> anyhow::Result<(AgentSettings, Vec<PathBuf>)> {
    let project_dir = args.project_dir(cwd);
    if !project_dir.is_dir() {
        anyhow::bail!("Project directory does not exist: {}", project_dir.display());
    }
    AgentSettings::load(&project_dir, args.overrides(&project_dir))
        .await
        .with_context(|| format!("Failed to load configuration for {}", project_dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_only_set_flags() {
        let dir = TempDir::new().unwrap();
        let args = SettingsArgs {
            model: Some("gpt-4o-mini".into()),
            max_iterations: Some(3),
            ..Default::default()
        };
        let overrides = args.overrides(dir.path());
        assert_eq!(overrides.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(overrides.max_loop_iterations, Some(3));
        assert!(overrides.provider.is_none());
        assert!(overrides.allowed_roots.is_none());
    }

    #[test]
    fn test_root_flag_becomes_allowed_root() {
        let dir = TempDir::new().unwrap();
        let args = SettingsArgs {
            root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let project = args.project_dir(Path::new("/"));
        assert_eq!(
            args.overrides(&project).allowed_roots,
            Some(vec![project.clone()])
        );
    }
}
