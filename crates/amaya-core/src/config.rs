//! Agent settings.
//!
//! Settings are loaded from several sources and merged, later sources
//! overriding earlier ones field by field:
//! 1. Global config: `~/.config/amaya/config.json` (or `amaya.json(c)`)
//! 2. Environment variable: `AMAYA_CONFIG_CONTENT`
//! 3. Project config: `amaya.jsonc` or `amaya.json` in the project directory
//! 4. Caller overrides (CLI flags)
//!
//! Files are JSONC (JSON with comments) and support variable substitution:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents, relative to the config file
//!
//! The merged [`ConfigFile`] is resolved into an [`AgentSettings`], which
//! is immutable for the duration of a run.

use crate::error::ConfigError;
use amaya_mcp::ServerConfig;
use amaya_provider::{ModelSettings, ProviderKind};
use amaya_tools::Capability;
use amaya_util::PathGuard;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

/// Static regex for variable substitution, compiled once.
static VAR_REGEX: OnceLock<Option<regex::Regex>> = OnceLock::new();

fn var_regex() -> Option<&'static regex::Regex> {
    VAR_REGEX
        .get_or_init(|| regex::Regex::new(r"\{(env|file):([^}]+)\}").ok())
        .as_ref()
}

/// Environment variable holding a whole config document.
pub const CONFIG_CONTENT_ENV: &str = "AMAYA_CONFIG_CONTENT";

const GLOBAL_FILES: &[&str] = &["config.json", "amaya.json", "amaya.jsonc"];
const PROJECT_FILES: &[&str] = &["amaya.jsonc", "amaya.json"];

/// Provider retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first failed request.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: u64,
    /// Cap on the backoff delay. A provider-supplied `retry-after` is not capped.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2000,
            backoff_factor: 2,
            max_delay_ms: 30_000,
        }
    }
}

/// One configuration source.
///
/// Every field is optional; an unset field leaves the value from a lower
/// source in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// JSON Schema reference.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_loop_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_recursion_depth: Option<u32>,

    /// Allowed filesystem roots; relative entries are resolved against the
    /// project directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_roots: Option<Vec<PathBuf>>,
    /// Extra blocked shell command patterns (`*` wildcards).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_commands: Option<Vec<String>>,
    /// Granted capabilities. Defaults to everything but raw shell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_subagents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_stagger_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_max_timeout_ms: Option<u64>,

    /// Directory for `update_memory` notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,

    /// MCP servers by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<BTreeMap<String, ServerConfig>>,
}

impl ConfigFile {
    /// Load a config file, expanding substitutions.
    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let base = path.parent().unwrap_or(Path::new("."));
        let content = substitute_variables(&content, base)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> Result<Self, ConfigError> {
        let stripped = strip_comments(content);
        serde_json::from_str(&stripped).map_err(|e| ConfigError::InvalidJson {
            path: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Merge another source into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        self.schema = merge_option(self.schema, other.schema);
        self.provider = merge_option(self.provider, other.provider);
        self.model = merge_option(self.model, other.model);
        self.api_key = merge_option(self.api_key, other.api_key);
        self.base_url = merge_option(self.base_url, other.base_url);
        self.max_tokens = merge_option(self.max_tokens, other.max_tokens);
        self.temperature = merge_option(self.temperature, other.temperature);
        self.system_prompt = merge_option(self.system_prompt, other.system_prompt);
        self.max_loop_iterations = merge_option(self.max_loop_iterations, other.max_loop_iterations);
        self.max_recursion_depth = merge_option(self.max_recursion_depth, other.max_recursion_depth);
        self.allowed_roots = merge_option(self.allowed_roots, other.allowed_roots);
        self.blocked_commands = merge_option(self.blocked_commands, other.blocked_commands);
        self.capabilities = merge_option(self.capabilities, other.capabilities);
        self.max_subagents = merge_option(self.max_subagents, other.max_subagents);
        self.subagent_max_iterations =
            merge_option(self.subagent_max_iterations, other.subagent_max_iterations);
        self.subagent_stagger_ms = merge_option(self.subagent_stagger_ms, other.subagent_stagger_ms);
        self.shell_timeout_ms = merge_option(self.shell_timeout_ms, other.shell_timeout_ms);
        self.shell_max_timeout_ms = merge_option(self.shell_max_timeout_ms, other.shell_max_timeout_ms);
        self.memory_dir = merge_option(self.memory_dir, other.memory_dir);
        self.retry = merge_option(self.retry, other.retry);

        // Server maps merge entry by entry.
        self.mcp_servers = match (self.mcp_servers, other.mcp_servers) {
            (Some(mut base), Some(other)) => {
                base.extend(other);
                Some(base)
            }
            (base, None) => base,
            (None, other) => other,
        };

        self
    }

    /// Resolve into settings for a project.
    pub fn resolve(self, project_dir: &Path) -> Result<AgentSettings, ConfigError> {
        let defaults = AgentSettings::for_root(project_dir);
        let model_defaults = ModelSettings::default();

        let settings = AgentSettings {
            model: ModelSettings {
                provider: self.provider.unwrap_or(model_defaults.provider),
                model: self.model.unwrap_or_default(),
                api_key: self.api_key.unwrap_or_default(),
                base_url: self.base_url.filter(|u| !u.trim().is_empty()),
                max_tokens: self.max_tokens.unwrap_or(model_defaults.max_tokens),
                temperature: self.temperature.unwrap_or(model_defaults.temperature),
                system_prompt: self.system_prompt,
            },
            max_loop_iterations: self
                .max_loop_iterations
                .unwrap_or(defaults.max_loop_iterations),
            max_recursion_depth: self
                .max_recursion_depth
                .unwrap_or(defaults.max_recursion_depth),
            allowed_roots: match self.allowed_roots {
                Some(roots) if !roots.is_empty() => roots
                    .iter()
                    .map(|root| amaya_util::path::resolve(root, project_dir))
                    .collect(),
                _ => defaults.allowed_roots,
            },
            blocked_commands: self.blocked_commands.unwrap_or_default(),
            capabilities: self.capabilities.unwrap_or(defaults.capabilities),
            max_subagents: self.max_subagents.unwrap_or(defaults.max_subagents),
            subagent_max_iterations: self
                .subagent_max_iterations
                .unwrap_or(defaults.subagent_max_iterations),
            subagent_stagger_ms: self
                .subagent_stagger_ms
                .unwrap_or(defaults.subagent_stagger_ms),
            shell_timeout_ms: self.shell_timeout_ms.unwrap_or(defaults.shell_timeout_ms),
            shell_max_timeout_ms: self
                .shell_max_timeout_ms
                .unwrap_or(defaults.shell_max_timeout_ms),
            memory_dir: self
                .memory_dir
                .map(|dir| amaya_util::path::resolve(&dir, project_dir)),
            retry: self.retry.unwrap_or_default(),
            mcp_servers: self.mcp_servers.unwrap_or_default(),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Everything one agent run needs to know. Never mutated by the loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSettings {
    pub model: ModelSettings,
    /// Model calls per run before the loop gives up.
    pub max_loop_iterations: u32,
    /// How deep sub-agents may nest below the top-level loop.
    pub max_recursion_depth: u32,
    pub allowed_roots: Vec<PathBuf>,
    pub blocked_commands: Vec<String>,
    pub capabilities: Vec<Capability>,
    pub max_subagents: usize,
    pub subagent_max_iterations: u32,
    pub subagent_stagger_ms: u64,
    pub shell_timeout_ms: u64,
    pub shell_max_timeout_ms: u64,
    pub memory_dir: Option<PathBuf>,
    pub retry: RetrySettings,
    pub mcp_servers: BTreeMap<String, ServerConfig>,
}

impl AgentSettings {
    /// Default settings rooted at `root`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            model: ModelSettings::default(),
            max_loop_iterations: 10,
            max_recursion_depth: 1,
            allowed_roots: vec![root.to_path_buf()],
            blocked_commands: Vec::new(),
            capabilities: Capability::default_grants(),
            max_subagents: amaya_tools::subagent::DEFAULT_MAX_SUBAGENTS,
            subagent_max_iterations: 8,
            subagent_stagger_ms: 2000,
            shell_timeout_ms: amaya_tools::shell::DEFAULT_TIMEOUT_MS,
            shell_max_timeout_ms: amaya_tools::shell::MAX_TIMEOUT_MS,
            memory_dir: None,
            retry: RetrySettings::default(),
            mcp_servers: BTreeMap::new(),
        }
    }

    /// Load settings from all sources.
    ///
    /// `overrides` is applied last. Returns the settings and the files that
    /// contributed to them.
    pub async fn load(
        project_dir: &Path,
        overrides: ConfigFile,
    ) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = ConfigFile::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = amaya_util::path::config_dir() {
            if let Some(path) = first_existing(&global_dir, GLOBAL_FILES) {
                config = config.merge(ConfigFile::load_file(&path).await?);
                sources.push(path);
            }
        }

        if let Ok(content) = std::env::var(CONFIG_CONTENT_ENV) {
            let content = substitute_variables(&content, project_dir)?;
            config = config.merge(ConfigFile::parse_jsonc(&content, CONFIG_CONTENT_ENV)?);
        }

        if let Some(path) = first_existing(project_dir, PROJECT_FILES) {
            config = config.merge(ConfigFile::load_file(&path).await?);
            sources.push(path);
        }

        config = config.merge(overrides);
        debug!(sources = sources.len(), "Loaded configuration");
        Ok((config.resolve(project_dir)?, sources))
    }

    /// Check invariants the loop relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_loop_iterations == 0 {
            return Err(ConfigError::validation("max_loop_iterations must be at least 1"));
        }
        if self.subagent_max_iterations == 0 {
            return Err(ConfigError::validation(
                "subagent_max_iterations must be at least 1",
            ));
        }
        if self.allowed_roots.is_empty() {
            return Err(ConfigError::validation("at least one allowed root is required"));
        }
        if self.max_subagents == 0 {
            return Err(ConfigError::validation("max_subagents must be at least 1"));
        }
        if self.shell_timeout_ms > self.shell_max_timeout_ms {
            return Err(ConfigError::validation(format!(
                "shell_timeout_ms ({}) exceeds shell_max_timeout_ms ({})",
                self.shell_timeout_ms, self.shell_max_timeout_ms
            )));
        }
        for (name, server) in &self.mcp_servers {
            if server.url.trim().is_empty() {
                return Err(ConfigError::validation(format!(
                    "MCP server '{}' has no url",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// The guard for these settings. Chaining is allowed only with the raw
    /// shell capability.
    pub fn guard(&self) -> PathGuard {
        PathGuard::new(self.allowed_roots.iter().cloned())
            .with_blocked_patterns(self.blocked_commands.clone())
            .with_raw_shell(self.has_capability(Capability::RawShell))
    }

    /// Delay between sub-agent starts.
    pub fn subagent_stagger(&self) -> Duration {
        Duration::from_millis(self.subagent_stagger_ms)
    }
}

/// Source of the settings snapshot for a run.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Arc<AgentSettings>;
}

/// Settings fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticSettings(Arc<AgentSettings>);

impl StaticSettings {
    pub fn new(settings: AgentSettings) -> Self {
        Self(Arc::new(settings))
    }
}

impl SettingsProvider for StaticSettings {
    fn current(&self) -> Arc<AgentSettings> {
        self.0.clone()
    }
}

fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|name| dir.join(name)).find(|p| p.exists())
}

/// Merge two Option values.
fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}

/// Strip `//` and `/* */` comments outside of strings.
fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }
        if c == '\\' && in_string {
            result.push(c);
            escape_next = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }
        if in_string {
            result.push(c);
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        // Keep line numbers in parse errors accurate.
                        if c == '\n' {
                            result.push('\n');
                        }
                        prev = c;
                    }
                    continue;
                }
                _ => {}
            }
        }

        result.push(c);
    }

    result
}

/// Expand `{env:NAME}` and `{file:path}` references.
fn substitute_variables(content: &str, base_dir: &Path) -> Result<String, ConfigError> {
    let Some(re) = var_regex() else {
        return Ok(content.to_string());
    };

    let mut result = content.to_string();
    for cap in re.captures_iter(content) {
        let (Some(full), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        let value = value.as_str();

        let replacement = match kind.as_str() {
            "env" => std::env::var(value).map_err(|_| ConfigError::EnvVarNotFound {
                name: value.to_string(),
            })?,
            "file" => {
                let path = base_dir.join(value);
                std::fs::read_to_string(&path)
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::FileRefNotFound {
                        path: path.display().to_string(),
                    })?
            }
            _ => continue,
        };
        result = result.replace(full.as_str(), &replacement);
    }

    Ok(result)
}
