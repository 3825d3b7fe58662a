//! Non-interactive run command.

use super::{load_settings, logging, SettingsArgs};
use crate::reminders::JsonReminderScheduler;
use amaya_core::Runtime;
use amaya_provider::Provider;
use amaya_storage::JsonConversationStore;
use anyhow::Context;
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Continue a stored conversation
    #[arg(short, long)]
    pub conversation: Option<String>,

    /// Message to send
    #[arg(num_args = 0..)]
    pub message: Vec<String>,
}

/// Run one turn and print the final answer.
pub async fn run_command(cwd: &Path, args: RunArgs, verbose: bool) -> anyhow::Result<()> {
    let prompt = args.message.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No message provided. Usage: amaya run <message>");
    }

    let (settings, sources) = load_settings(cwd, &args.settings).await?;
    info!(
        provider = %settings.model.provider,
        model = %settings.model.model_id(),
        sources = sources.len(),
        "Starting run"
    );

    let provider = Provider::from_settings(&settings.model).with_context(|| {
        format!(
            "Cannot use provider '{}'. Set api_key in amaya.jsonc or export {}",
            settings.model.provider,
            settings.model.provider.api_key_env()
        )
    })?;
    let store = JsonConversationStore::default_location()
        .context("Could not determine the data directory for conversations")?;

    let mut builder = Runtime::builder(Arc::new(provider), Arc::new(settings));
    if let Some(scheduler) = JsonReminderScheduler::default_location() {
        builder = builder.with_scheduler(Arc::new(scheduler));
    }
    if verbose {
        let (tx, rx) = mpsc::unbounded_channel();
        logging::spawn_event_printer(rx);
        builder = builder.with_events(tx);
    }
    let runtime = builder.build().await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            on_interrupt.cancel();
        }
    });

    let result = runtime
        .run_turn(&store, args.conversation.as_deref(), &prompt, &cancel)
        .await;
    runtime.shutdown().await;

    let (id, summary) = result?;
    println!("{}", summary.answer.trim_end());
    eprintln!();
    eprintln!(
        "Conversation {id} ({} model calls, {} tool calls)",
        summary.iterations, summary.tool_calls
    );
    Ok(())
}
