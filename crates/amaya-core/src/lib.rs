//! Agent runtime for amaya.
//!
//! This crate ties the providers, tools and MCP bridge together:
//! - Configuration loading (JSONC files, environment, overrides)
//! - The agent loop with provider retry and cooperative cancellation
//! - Sub-agent spawning with a bounded recursion depth
//! - Runtime assembly and conversation persistence per turn

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod retry;
pub mod runtime;
pub mod subagent;

pub use agent::{AgentLoop, RunSummary};
pub use config::{
    AgentSettings, ConfigFile, RetrySettings, SettingsProvider, StaticSettings,
    CONFIG_CONTENT_ENV,
};
pub use error::{AgentError, AgentResult, ConfigError};
pub use event::AgentEvent;
pub use retry::{calculate_delay, RetryHelper};
pub use runtime::{Runtime, RuntimeBuilder};
pub use subagent::SubagentSpawner;
