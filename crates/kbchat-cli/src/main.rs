//! kbchat - knowledge-base chat from the terminal.

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use config::Config;
use logging::{LogConfig, LogFormat};

/// Chat with a knowledge base over the kbchat streaming API.
#[derive(Parser, Debug)]
#[command(name = "kbchat")]
#[command(about = "Knowledge-base chat client")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "stream=debug" or "watchdog=trace")
    /// Can be specified multiple times. Targets are prefixed with "kbchat::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask a single question and stream the answer
    Ask {
        question: String,
        /// Continue an existing conversation
        #[arg(short = 'C', long, value_name = "ID")]
        conversation: Option<Uuid>,
    },
    /// Interactive chat session
    Chat {
        /// Continue an existing conversation
        #[arg(short = 'C', long, value_name = "ID")]
        conversation: Option<Uuid>,
    },
    /// List stored conversations
    List,
    /// Export a conversation as a plain-text transcript
    Export {
        id: Uuid,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Delete a conversation
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::info!(
        target: "kbchat::startup",
        "Loaded configuration (server: {})",
        config.server_url
    );

    match cli.command {
        Command::Ask {
            question,
            conversation,
        } => commands::ask(config, &question, conversation).await,
        Command::Chat { conversation } => commands::chat(config, conversation).await,
        Command::List => commands::list(config),
        Command::Export { id, output } => commands::export(config, id, output),
        Command::Delete { id } => commands::delete(config, id),
    }
}
