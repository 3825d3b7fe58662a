//! Shared utilities for amaya.
//!
//! This crate provides common pieces used across the amaya workspace:
//! - Logging setup with tracing
//! - ULID-based identifier generation
//! - Path utilities
//! - Wildcard pattern matching
//! - The path/command guard that every filesystem and shell tool goes through

pub mod guard;
pub mod id;
pub mod log;
pub mod path;
pub mod wildcard;

pub use guard::{Denied, PathGuard};
pub use id::{IdPrefix, Identifier};
