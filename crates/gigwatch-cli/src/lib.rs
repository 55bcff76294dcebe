//! GigWatch command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GigWatch - chat-driven monitoring assistant
#[derive(Parser)]
#[command(name = "gigwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a JSON5 config file
    #[arg(short, long, env = "GIGWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Send one message and print the reply
    Chat {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Print the visible conversation history
    History {
        /// Number of most recent messages to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of plain lines
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config(commands::config::ConfigArgs),
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat { text } => commands::chat::send(config_path, &text.join(" ")).await,
        Commands::History { limit, json } => commands::chat::history(config_path, limit, json).await,
        Commands::Config(args) => commands::config::run(config_path, args),
    }
}
