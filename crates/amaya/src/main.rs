//! Amaya - an agent that works in your project through guarded tools.
//!
//! This is the main entry point for the amaya CLI.

mod commands;
mod reminders;

use clap::{Parser, Subcommand};
use commands::run::RunArgs;
use commands::SettingsArgs;

#[derive(Parser)]
#[command(name = "amaya")]
#[command(author, version, about = "Agentic tool-execution runtime", long_about = None)]
struct Cli {
    /// Enable verbose logging and progress output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one turn with a message (non-interactive)
    Run(RunArgs),
    /// List the tools the model would be offered
    Tools {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Show configured MCP servers and their status
    Mcp {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Show the effective configuration
    Config {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_file = commands::logging::init_logging(cli.verbose);
    let cwd = std::env::current_dir()?;

    let result = match cli.command {
        Commands::Run(args) => commands::run::run_command(&cwd, args, cli.verbose).await,
        Commands::Tools { settings } => commands::tools::list_tools(&cwd, &settings).await,
        Commands::Mcp { settings } => commands::tools::list_mcp_servers(&cwd, &settings).await,
        Commands::Config { settings } => commands::config::show_config(&cwd, &settings).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    };

    if result.is_err() {
        if let Some(path) = log_file {
            eprintln!("Logs: {}", path.display());
        }
    }
    result
}

fn print_version() {
    println!("amaya {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("An agent that works in your project through guarded tools.");
}
