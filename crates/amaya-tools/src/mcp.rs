//! MCP tool wrapper.
//!
//! Tools discovered on MCP servers are registered next to the local ones.
//! Each call is proxied through the [`McpBridge`] to the server that
//! advertised the tool.

use crate::registry::{ToolDescriptor, ToolOrigin, ToolRegistry};
use crate::{Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use amaya_mcp::{McpBridge, McpError, McpToolDescriptor};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// A wrapper that makes an MCP tool callable like a local one.
pub struct McpToolWrapper {
    bridge: Arc<McpBridge>,
    tool: McpToolDescriptor,
}

impl McpToolWrapper {
    pub fn new(bridge: Arc<McpBridge>, tool: McpToolDescriptor) -> Self {
        Self { bridge, tool }
    }

    /// Server that provides this tool.
    pub fn server(&self) -> &str {
        &self.tool.server
    }

    /// Registry entry for the wrapped tool.
    pub fn into_descriptor(self) -> ToolDescriptor {
        let origin = ToolOrigin::Mcp(self.tool.server.clone());
        let mut descriptor = ToolDescriptor::local(Arc::new(self));
        descriptor.origin = origin;
        descriptor
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn id(&self) -> &str {
        &self.tool.name
    }

    fn description(&self) -> &str {
        &self.tool.description
    }

    fn parameters_schema(&self) -> Value {
        if self.tool.input_schema.is_object() {
            self.tool.input_schema.clone()
        } else {
            json!({ "type": "object" })
        }
    }

    fn capability(&self) -> Capability {
        Capability::Network
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let call = self
            .bridge
            .call_on(&self.tool.server, &self.tool.name, args);
        let result = tokio::select! {
            result = call => result,
            _ = ctx.abort.cancelled() => return Err(ToolError::Cancelled),
        };

        match result {
            Ok(text) => Ok(ToolOutput::new(format!("MCP: {}", self.tool.name), text)
                .with_metadata(json!({ "server": self.tool.server }))),
            Err(McpError::ToolError(message)) => Err(ToolError::execution_failed(message)),
            Err(e) => Err(ToolError::execution_failed(format!(
                "MCP server '{}': {}",
                self.tool.server, e
            ))),
        }
    }
}

/// Discover every ready server's tools and merge them into `registry`.
///
/// Tools whose name is already taken are skipped (and recorded as shadowed
/// by the registry). Returns how many were added.
pub async fn merge_discovered(registry: &mut ToolRegistry, bridge: &Arc<McpBridge>) -> usize {
    let mut added = 0;
    for tool in bridge.discover_all().await {
        let wrapper = McpToolWrapper::new(bridge.clone(), tool);
        if registry.merge_remote(wrapper.into_descriptor()) {
            added += 1;
        }
    }
    if added > 0 {
        info!(count = added, "Registered MCP tools");
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::WorkspaceIndex;
    use crate::registry::Builtins;
    use crate::testing;
    use amaya_mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
    use amaya_mcp::{McpResult, Transport};
    use tempfile::tempdir;

    struct FakeServer;

    #[async_trait]
    impl Transport for FakeServer {
        async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
            let id = request.id;
            Ok(match request.method.as_str() {
                "initialize" => JsonRpcResponse::success(
                    id,
                    json!({"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}}),
                ),
                "tools/list" => JsonRpcResponse::success(
                    id,
                    json!({"tools": [
                        {"name": "lookup", "description": "Look things up",
                         "inputSchema": {"type": "object", "required": ["q"],
                                         "properties": {"q": {"type": "string"}}}},
                        {"name": "read_file", "description": "Remote read"},
                        {"name": "broken", "description": "Always fails"}
                    ]}),
                ),
                "tools/call" => {
                    let params = request.params.unwrap_or_default();
                    if params["name"] == "broken" {
                        JsonRpcResponse::success(
                            id,
                            json!({"content": [{"type": "text", "text": "upstream down"}], "isError": true}),
                        )
                    } else {
                        JsonRpcResponse::success(
                            id,
                            json!({"content": [{"type": "text", "text": format!("found {}", params["arguments"]["q"])}]}),
                        )
                    }
                }
                other => JsonRpcResponse::failure(id, -32601, format!("no method {other}")),
            })
        }

        async fn notify(&self, _notification: JsonRpcNotification) -> McpResult<()> {
            Ok(())
        }

        async fn close(&self) -> McpResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    async fn bridge() -> Arc<McpBridge> {
        let bridge = Arc::new(McpBridge::new());
        bridge
            .connect_with("docs", "memory://docs", Arc::new(FakeServer))
            .await;
        bridge
    }

    #[tokio::test]
    async fn test_merge_keeps_local_tools() {
        let bridge = bridge().await;
        let mut registry = ToolRegistry::with_builtins(&Builtins::new(Arc::new(WorkspaceIndex)));
        let local_read = registry.resolve("read_file").unwrap().origin.clone();

        let added = merge_discovered(&mut registry, &bridge).await;
        assert_eq!(added, 2);
        assert_eq!(registry.resolve("read_file").unwrap().origin, local_read);
        assert_eq!(
            registry.resolve("lookup").unwrap().origin,
            ToolOrigin::Mcp("docs".to_string())
        );
        assert_eq!(registry.resolve("lookup").unwrap().capability, Capability::Network);
        assert_eq!(registry.shadowed().len(), 1);
        assert_eq!(registry.shadowed()[0].server, "docs");
    }

    #[tokio::test]
    async fn test_call_through_bridge() {
        let bridge = bridge().await;
        let tools = bridge.discover("docs").await.unwrap();
        let dir = tempdir().unwrap();
        let ctx = testing::context(dir.path());

        let lookup = tools.iter().find(|t| t.name == "lookup").unwrap().clone();
        let out = McpToolWrapper::new(bridge.clone(), lookup)
            .execute(json!({"q": "retry"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "found \"retry\"");

        let broken = tools.iter().find(|t| t.name == "broken").unwrap().clone();
        let wrapper = McpToolWrapper::new(bridge.clone(), broken);
        assert_eq!(wrapper.parameters_schema(), json!({"type": "object"}));
        let err = wrapper.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(ref m) if m == "upstream down"));
    }
}
