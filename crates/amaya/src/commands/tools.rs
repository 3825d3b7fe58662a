//! Tool and MCP server listings.

use super::{load_settings, SettingsArgs};
use amaya_core::Runtime;
use amaya_provider::{
    AssistantTurn, Conversation, ModelSettings, ProviderAdapter, ProviderError, ProviderResult,
    ToolDefinition,
};
use amaya_tools::ToolOrigin;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Stands in for the model when a command only inspects the runtime.
struct Offline;

#[async_trait]
impl ProviderAdapter for Offline {
    async fn send(
        &self,
        _conversation: &Conversation,
        _tools: &[ToolDefinition],
        _settings: &ModelSettings,
    ) -> ProviderResult<AssistantTurn> {
        Err(ProviderError::internal("no model is used by this command"))
    }

    fn provider_id(&self) -> &str {
        "offline"
    }
}

async fn inspect_runtime(cwd: &Path, args: &SettingsArgs) -> anyhow::Result<Runtime> {
    let (settings, _) = load_settings(cwd, args).await?;
    Ok(Runtime::builder(Arc::new(Offline), Arc::new(settings))
        .build()
        .await?)
}

/// List every tool the model would be offered.
pub async fn list_tools(cwd: &Path, args: &SettingsArgs) -> anyhow::Result<()> {
    let runtime = inspect_runtime(cwd, args).await?;
    let granted = runtime.dispatcher().granted();

    println!("Local tools:");
    for descriptor in runtime.registry().descriptors().filter(|d| d.is_local()) {
        let marker = if granted.contains(&descriptor.capability) {
            ""
        } else {
            "  (not granted)"
        };
        println!(
            "  {:<20} {}{}",
            descriptor.name, descriptor.capability, marker
        );
    }

    let remote: Vec<_> = runtime
        .registry()
        .descriptors()
        .filter_map(|d| match &d.origin {
            ToolOrigin::Mcp(server) => Some((d, server)),
            ToolOrigin::Local => None,
        })
        .collect();
    if !remote.is_empty() {
        println!();
        println!("MCP tools:");
        for (descriptor, server) in remote {
            println!("  {:<20} {}", descriptor.name, server);
        }
    }
    for shadowed in runtime.registry().shadowed() {
        println!(
            "  (skipped '{}' from {}: name taken)",
            shadowed.name, shadowed.server
        );
    }

    runtime.shutdown().await;
    Ok(())
}

/// Show each configured MCP server and what it offers.
pub async fn list_mcp_servers(cwd: &Path, args: &SettingsArgs) -> anyhow::Result<()> {
    let runtime = inspect_runtime(cwd, args).await?;
    let configured = &runtime.settings().mcp_servers;

    if configured.is_empty() {
        println!("No MCP servers configured.");
        println!();
        println!("Add servers to amaya.jsonc:");
        println!(r#"  "mcp_servers": {{ "docs": {{ "url": "https://example.com/mcp" }} }}"#);
        return Ok(());
    }

    println!("MCP servers:");
    let handles = runtime.bridge().handles().await;
    for (name, config) in configured {
        match handles.iter().find(|h| &h.name == name) {
            Some(handle) => println!(
                "  {:<16} {:<10} {} tools  {}",
                name,
                handle.state,
                handle.tools.len(),
                handle.endpoint
            ),
            None => println!("  {:<16} {:<10} -        {}", name, "disabled", config.url),
        }
    }

    runtime.shutdown().await;
    Ok(())
}
