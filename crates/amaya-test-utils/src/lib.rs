//! Testing utilities for amaya.
//!
//! - **Providers**: [`ScriptedProvider`], a model stub that replays a queue
//!   of turns and records what it was sent
//! - **Fixtures**: [`TestProject`], a temporary project directory builder
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use amaya_test_utils::{ScriptedProvider, TestProject};
//!
//! let project = TestProject::new()
//!     .with_file("src/main.rs", "fn main() {}")
//!     .build();
//!
//! let provider = ScriptedProvider::new()
//!     .then_tool_call("c1", "read_file", json!({"path": "src/main.rs"}))
//!     .then_answer("It is an empty main.");
//! ```

pub mod fixtures;
pub mod providers;

pub use fixtures::{BuiltTestProject, TestProject};
pub use providers::{RecordedCall, ScriptedProvider};
