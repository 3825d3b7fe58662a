//! Effective configuration display.

use super::{load_settings, SettingsArgs};
use amaya_core::AgentSettings;
use serde_json::Value;
use std::path::Path;

/// Print the configuration sources and the merged settings.
pub async fn show_config(cwd: &Path, args: &SettingsArgs) -> anyhow::Result<()> {
    let (settings, sources) = load_settings(cwd, args).await?;

    println!("Configuration sources:");
    if sources.is_empty() {
        println!("  (none)");
    } else {
        for source in &sources {
            println!("  {}", source.display());
        }
    }
    println!();

    println!("Current configuration:");
    println!("{}", serde_json::to_string_pretty(&masked(&settings)?)?);
    Ok(())
}

/// Settings as JSON with secrets replaced.
fn masked(settings: &AgentSettings) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(settings)?;
    value["model"]["api_key"] = Value::String(settings.model.masked_api_key());

    if let Some(servers) = value.get_mut("mcp_servers").and_then(Value::as_object_mut) {
        for server in servers.values_mut() {
            if let Some(headers) = server.get_mut("headers").and_then(Value::as_object_mut) {
                for header in headers.values_mut() {
                    *header = Value::String("****".into());
                }
            }
        }
    }
    Ok(value)
}
