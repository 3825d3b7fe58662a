//! Logging setup using tracing.
//!
//! One subscriber is installed per process. Library crates only emit
//! events; the binary decides where they go.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events are shown by default.
const AMAYA_TARGETS: &[&str] = &[
    "amaya",
    "amaya_core",
    "amaya_provider",
    "amaya_tools",
    "amaya_mcp",
    "amaya_storage",
];

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Print to stderr instead of a file.
    pub print: bool,
    /// Level applied to the amaya crates.
    pub level: LogLevel,
    /// Include file/line info in each event.
    pub include_location: bool,
    /// Log file path, used when `print` is false.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Build the default filter directive for this config.
    pub fn directive(&self) -> String {
        AMAYA_TARGETS
            .iter()
            .map(|target| format!("{target}={}", self.level.as_str()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Initialize logging with the given configuration.
///
/// `RUST_LOG` overrides the computed filter. Returns the log file in use,
/// if any. Calling this twice is harmless; the second call is ignored.
pub fn init(config: LogConfig) -> Option<PathBuf> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));

    if config.print {
        let layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_file(config.include_location)
            .with_line_number(config.include_location);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
        return None;
    }

    let path = config.file.clone().or_else(default_log_path)?;
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Warning: could not create log directory: {e}");
            return None;
        }
    }

    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: could not open log file: {e}");
            return None;
        }
    };

    let layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(file)
        .with_file(config.include_location)
        .with_line_number(config.include_location);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();

    Some(path)
}

/// Get the default log file path.
pub fn default_log_path() -> Option<PathBuf> {
    crate::path::data_dir().map(|p| p.join("logs").join("amaya.log"))
}
