//! Bridge between the agent and external MCP servers.

use crate::error::{McpError, McpResult};
use crate::http::{HttpConfig, HttpTransport};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    ListToolsResult, McpTool, ToolCallResult,
};
use crate::server::{ConnectionState, McpServerHandle, ServerConfig};
use crate::transport::Transport;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Longest tool description passed on to the model, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 1023;

/// A tool discovered on an MCP server.
#[derive(Debug, Clone, PartialEq)]
pub struct McpToolDescriptor {
    /// Server that provides the tool.
    pub server: String,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

struct ServerConnection {
    endpoint: String,
    transport: Arc<dyn Transport>,
    state: ConnectionState,
    tools: Vec<McpTool>,
}

impl ServerConnection {
    fn descriptors(&self, server: &str) -> Vec<McpToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| McpToolDescriptor {
                server: server.to_string(),
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                input_schema: tool
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| json!({ "type": "object" })),
            })
            .collect()
    }
}

/// Maintains MCP server connections and proxies tool calls to them.
pub struct McpBridge {
    servers: RwLock<BTreeMap<String, ServerConnection>>,
    next_id: AtomicU64,
}

impl McpBridge {
    /// Create a bridge with no servers.
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a server from its configuration. Nothing is sent until
    /// [`discover`](Self::discover).
    pub async fn add_server(&self, name: &str, config: &ServerConfig) -> McpResult<()> {
        if !config.enabled {
            debug!(server = %name, "Server is disabled, skipping");
            return Ok(());
        }

        let transport = HttpTransport::new(HttpConfig {
            url: config.url.clone(),
            headers: config.headers.clone(),
            timeout_secs: 60,
        })?;
        self.connect_with(name, &config.url, Arc::new(transport))
            .await;
        Ok(())
    }

    /// Register a server reached through an explicit transport.
    pub async fn connect_with(&self, name: &str, endpoint: &str, transport: Arc<dyn Transport>) {
        self.servers.write().await.insert(
            name.to_string(),
            ServerConnection {
                endpoint: endpoint.to_string(),
                transport,
                state: ConnectionState::Disconnected,
                tools: Vec::new(),
            },
        );
    }

    /// Connect to a server and list its tools, once per connection.
    pub async fn discover(&self, server: &str) -> McpResult<Vec<McpToolDescriptor>> {
        let transport = {
            let mut servers = self.servers.write().await;
            let connection = servers
                .get_mut(server)
                .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
            if connection.state == ConnectionState::Ready {
                return Ok(connection.descriptors(server));
            }
            connection.state = ConnectionState::Connecting;
            connection.transport.clone()
        };

        info!(server = %server, "Connecting to MCP server");
        let outcome = self.handshake(server, transport.as_ref()).await;

        let mut servers = self.servers.write().await;
        let connection = servers
            .get_mut(server)
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
        match outcome {
            Ok(tools) => {
                info!(server = %server, tool_count = tools.len(), "Discovered MCP tools");
                connection.tools = tools;
                connection.state = ConnectionState::Ready;
                Ok(connection.descriptors(server))
            }
            Err(e) => {
                connection.state = ConnectionState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Discover every registered server. Servers that fail are left out.
    pub async fn discover_all(&self) -> Vec<McpToolDescriptor> {
        let names: Vec<String> = self.servers.read().await.keys().cloned().collect();
        let mut descriptors = Vec::new();
        for name in names {
            match self.discover(&name).await {
                Ok(found) => descriptors.extend(found),
                Err(e) => warn!(server = %name, error = %e, "MCP server unavailable, omitting its tools"),
            }
        }
        descriptors
    }

    async fn handshake(&self, server: &str, transport: &dyn Transport) -> McpResult<Vec<McpTool>> {
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "initialize",
            Some(serde_json::to_value(InitializeParams::default())?),
        );
        let response = transport.request(request).await?;
        if let Some(error) = response.error {
            return Err(McpError::InitializationFailed(error.message));
        }
        let init: InitializeResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::protocol_error("Missing initialize result"))?,
        )
        .map_err(|e| McpError::protocol_error(e.to_string()))?;
        debug!(
            server = %server,
            protocol_version = %init.protocol_version,
            "MCP server initialized"
        );

        transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;

        let request = JsonRpcRequest::new(self.next_request_id(), "tools/list", None);
        let response = transport.request(request).await?;
        if let Some(error) = response.error {
            warn!(server = %server, code = error.code, message = %error.message, "Failed to list tools");
            return Ok(Vec::new());
        }
        let listed: ListToolsResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::protocol_error("Missing tools/list result"))?,
        )
        .map_err(|e| McpError::protocol_error(e.to_string()))?;

        Ok(listed
            .tools
            .into_iter()
            .filter(|tool| {
                let blank = tool.name.trim().is_empty();
                if blank {
                    warn!(server = %server, "Skipping MCP tool with a blank name");
                }
                !blank
            })
            .map(|mut tool| {
                tool.description = tool.description.map(|d| truncate_chars(&d));
                tool
            })
            .collect())
    }

    /// Call a tool on whichever ready server provides it.
    pub async fn call(&self, tool_name: &str, arguments: Value) -> McpResult<String> {
        let server = {
            let servers = self.servers.read().await;
            servers
                .iter()
                .filter(|(_, conn)| conn.state == ConnectionState::Ready)
                .find(|(_, conn)| conn.tools.iter().any(|t| t.name == tool_name))
                .map(|(name, _)| name.clone())
                .ok_or_else(|| McpError::ToolNotFound(tool_name.to_string()))?
        };
        self.call_on(&server, tool_name, arguments).await
    }

    /// Call a tool on a specific server.
    ///
    /// Returns the tool's text output; a result flagged `isError` becomes
    /// [`McpError::ToolError`].
    pub async fn call_on(
        &self,
        server: &str,
        tool_name: &str,
        arguments: Value,
    ) -> McpResult<String> {
        let transport = {
            let servers = self.servers.read().await;
            let connection = servers
                .get(server)
                .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
            if connection.state != ConnectionState::Ready {
                return Err(McpError::connection_failed(format!(
                    "server '{}' is {}",
                    server, connection.state
                )));
            }
            connection.transport.clone()
        };

        debug!(tool = tool_name, server = %server, "Calling MCP tool");

        let params = CallToolParams {
            name: tool_name.to_string(),
            arguments: Some(arguments),
        };
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "tools/call",
            Some(serde_json::to_value(&params)?),
        );
        let response = transport.request(request).await.map_err(|e| {
            warn!(server = %server, tool = tool_name, error = %e, "MCP call failed");
            e
        })?;

        if let Some(error) = response.error {
            return Err(McpError::tool_error(error.message));
        }
        let result: ToolCallResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::protocol_error("Missing tools/call result"))?,
        )
        .map_err(|e| McpError::protocol_error(e.to_string()))?;

        let output = result.output_text();
        if result.is_error {
            return Err(McpError::tool_error(output));
        }
        Ok(output)
    }

    /// Snapshot of every registered server.
    pub async fn handles(&self) -> Vec<McpServerHandle> {
        self.servers
            .read()
            .await
            .iter()
            .map(|(name, conn)| McpServerHandle {
                name: name.clone(),
                endpoint: conn.endpoint.clone(),
                tools: conn.tools.clone(),
                state: conn.state.clone(),
            })
            .collect()
    }

    /// Close every transport and mark the servers disconnected.
    pub async fn close_all(&self) {
        let mut servers = self.servers.write().await;
        for (name, conn) in servers.iter_mut() {
            if let Err(e) = conn.transport.close().await {
                warn!(server = %name, error = %e, "Error closing server connection");
            }
            conn.state = ConnectionState::Disconnected;
            conn.tools.clear();
        }
    }
}

impl Default for McpBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_chars(text: &str) -> String {
    match text.char_indices().nth(MAX_DESCRIPTION_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
