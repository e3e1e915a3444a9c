// ABOUTME: CLI entry point for seren-converter
// ABOUTME: Parses commands, sets up logging, and routes to the command handlers

use clap::{Parser, Subcommand};
use seren_converter::commands;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "seren-converter")]
#[command(about = "Convert SQLite databases into PostgreSQL scripts or live databases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the configured source into the configured destination
    Convert {
        /// Configuration file; a sample is written if it does not exist
        #[arg(long, default_value = "seren-converter.toml")]
        config: PathBuf,
        /// Log phase progress and debug detail
        #[arg(short, long)]
        verbose: bool,
    },
    /// Transfer the rows of one table (used by parallel conversions)
    #[command(hide = true)]
    TransferTable {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Commands::Convert { verbose, .. } | Commands::TransferTable { verbose, .. } => {
                *verbose
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging - default to INFO (DEBUG when verbose) if RUST_LOG not set
    let default_level = if cli.command.verbose() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Convert { config, verbose } => {
            commands::convert(&config, verbose)?;
        }
        Commands::TransferTable { config, table, .. } => {
            commands::transfer_table(&config, &table)?;
        }
    }

    Ok(())
}
