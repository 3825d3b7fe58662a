//! Error types for the core crate.

use amaya_provider::ProviderError;
use thiserror::Error;

/// Fatal outcomes of an agent loop or sub-agent run.
///
/// Tool failures never show up here; they are fed back to the model as
/// tool results.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The provider failed and retries are exhausted, or the failure is
    /// not retryable.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("iteration limit exceeded ({limit} model calls)")]
    IterationLimitExceeded { limit: u32 },

    #[error("recursion limit exceeded (depth {depth}, limit {limit})")]
    RecursionLimitExceeded { depth: u32, limit: u32 },

    #[error("cancelled")]
    Cancelled,

    /// The spawner has no parent dispatcher to copy tools from.
    #[error("sub-agents unavailable: {0}")]
    SubagentUnavailable(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] amaya_storage::StorageError),

    #[error("tool registry error: {0}")]
    Registry(#[from] amaya_tools::RegistryError),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// File reference not found during substitution.
    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Result type for agent runs.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AgentError::IterationLimitExceeded { limit: 10 }.to_string(),
            "iteration limit exceeded (10 model calls)"
        );
        assert_eq!(
            AgentError::RecursionLimitExceeded { depth: 1, limit: 1 }.to_string(),
            "recursion limit exceeded (depth 1, limit 1)"
        );
        let config: AgentError = ConfigError::validation("max_loop_iterations must be > 0").into();
        assert!(config.to_string().starts_with("config error: config validation failed"));
    }
}
