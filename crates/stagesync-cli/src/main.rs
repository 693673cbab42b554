//! stagesync CLI - Command-line interface for stagesync
//!
//! Provides commands for:
//! - Running sync passes against the selected team
//! - Listing and selecting teams
//! - Inspecting the team's change ledger
//! - Viewing and editing configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stagesync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, device::DeviceCommand,
    ledger::LedgerCommand, status::StatusCommand, sync::SyncCommand, teams::TeamsCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "stagesync",
    version,
    about = "Team data sync for presentation workstations"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a sync pass with the selected team
    Sync(SyncCommand),
    /// Show connection and local data status
    Status(StatusCommand),
    /// List the provider's teams or select one
    Teams(TeamsCommand),
    /// Show the team's change ledger
    Ledger(LedgerCommand),
    /// Show this installation's device identity
    Device(DeviceCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let logging = Config::load_or_default(&config_path).logging;

    // Setup tracing
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "warn".to_string(),
        (false, 0) => logging.level,
        (false, 1) => "debug".to_string(),
        (false, _) => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(format, &config_path).await,
        Commands::Status(cmd) => cmd.execute(format, &config_path).await,
        Commands::Teams(cmd) => cmd.execute(format, &config_path).await,
        Commands::Ledger(cmd) => cmd.execute(format, &config_path).await,
        Commands::Device(cmd) => cmd.execute(format, &config_path).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}
