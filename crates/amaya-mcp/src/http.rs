//! Streamable HTTP transport for remote MCP servers.
//!
//! Requests go out as HTTP POST; the server answers with either a plain
//! JSON body or an SSE body carrying the JSON-RPC response in `data:` lines.

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Header carrying the server-assigned session.
const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// The server endpoint (e.g., `https://mcp.example.com/mcp`).
    pub url: String,
    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout_secs: 60,
        }
    }
}

/// HTTP transport for remote MCP servers.
pub struct HttpTransport {
    config: HttpConfig,
    client: Client,
    connected: AtomicBool,
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: HttpConfig) -> McpResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                McpError::connection_failed(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            client,
            connected: AtomicBool::new(false),
            session_id: RwLock::new(None),
        })
    }

    /// Build request with common headers.
    async fn build_request(&self, body: String) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(body);

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }
        if let Some(session) = self.session_id.read().await.as_deref() {
            req = req.header(SESSION_HEADER, session);
        }

        req
    }

    async fn send(&self, body: String) -> McpResult<reqwest::Response> {
        self.build_request(body).await.send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout
            } else if e.is_connect() {
                McpError::connection_failed(e.to_string())
            } else {
                McpError::protocol_error(format!("Request failed: {e}"))
            }
        })
    }

    async fn parse_response(&self, response: reqwest::Response) -> McpResult<JsonRpcResponse> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(McpError::AuthRequired);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::connection_failed(format!(
                "Server returned {status}: {text}"
            )));
        }

        let is_sse = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/event-stream"));

        let text = response
            .text()
            .await
            .map_err(|e| McpError::protocol_error(format!("Failed to read response: {e}")))?;

        if is_sse {
            parse_sse_body(&text)
        } else {
            serde_json::from_str(&text)
                .map_err(|e| McpError::protocol_error(format!("Invalid JSON response: {e}")))
        }
    }
}

/// Pick the JSON-RPC response out of an SSE body.
///
/// The last event carrying a `result` wins; an error response is used only
/// when no event carries a result.
pub(crate) fn parse_sse_body(body: &str) -> McpResult<JsonRpcResponse> {
    let mut last_result = None;
    let mut last_error = None;

    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data.trim()) {
            if response.result.is_some() {
                last_result = Some(response);
            } else if response.error.is_some() {
                last_error = Some(response);
            }
        }
    }

    last_result
        .or(last_error)
        .ok_or_else(|| McpError::protocol_error("SSE stream ended without response"))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let request_json = serde_json::to_string(&request)?;

        debug!(id = request.id, method = %request.method, "Sending MCP request");

        let response = self.send(request_json).await?;

        if let Some(session_id) = response.headers().get(SESSION_HEADER) {
            if let Ok(id) = session_id.to_str() {
                *self.session_id.write().await = Some(id.to_string());
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        self.parse_response(response).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let notification_json = serde_json::to_string(&notification)?;

        debug!(method = %notification.method, "Sending MCP notification");

        let response = self.send(notification_json).await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "Notification returned non-success status");
        }

        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        *self.session_id.write().await = None;
        debug!(url = %self.config.url, "Closed MCP HTTP transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
