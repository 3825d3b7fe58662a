//! Model Context Protocol (MCP) bridge for amaya.
//!
//! MCP servers expose extra tools over JSON-RPC. The [`McpBridge`] keeps
//! one connection per configured server, discovers its tools once per
//! connection and proxies `tools/call` requests.
//!
//! # Example
//!
//! ```no_run
//! use amaya_mcp::{McpBridge, ServerConfig};
//!
//! # async fn example() -> amaya_mcp::McpResult<()> {
//! let bridge = McpBridge::new();
//! bridge
//!     .add_server("docs", &ServerConfig::new("https://mcp.example.com/mcp"))
//!     .await?;
//!
//! for tool in bridge.discover_all().await {
//!     println!("{}: {}", tool.name, tool.description);
//! }
//!
//! let text = bridge
//!     .call("search_docs", serde_json::json!({ "query": "retry policy" }))
//!     .await?;
//! # let _ = text;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod error;
pub mod http;
pub mod protocol;
mod server;
mod transport;

pub use bridge::{McpBridge, McpToolDescriptor, MAX_DESCRIPTION_CHARS};
pub use error::{McpError, McpResult};
pub use http::{HttpConfig, HttpTransport};
pub use protocol::{McpTool, ToolCallResult, ToolContent};
pub use server::{ConnectionState, McpServerHandle, ServerConfig};
pub use transport::Transport;
