//! Stowage CLI - Command-line interface
//!
//! Checks, installs and manages versioned bundles in the local cache.

mod commands;
mod error;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use stowage::config::ConfigFile;
use stowage::logging::{default_log_dir, default_log_file, init_logging_full};
use tracing::info;

use commands::bundles::{BundleCommands, CommandContext};
use commands::config::ConfigCommands;
use commands::output::ConsoleOutput;
use error::CliError;

#[derive(Parser)]
#[command(name = "stowage")]
#[command(version = stowage::VERSION)]
#[command(about = "Download, cache and update versioned bundles", long_about = None)]
struct Cli {
    /// Also write logs to stdout
    #[arg(long, global = true)]
    verbose: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),

    #[command(flatten)]
    Bundle(BundleCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let command = match cli.command {
        Commands::Config(command) => return commands::config::run(command),
        Commands::Bundle(command) => command,
    };

    let _logging_guard =
        init_logging_full(&default_log_dir(), default_log_file(), cli.verbose, cli.debug)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;
    info!("Stowage v{}", stowage::VERSION);

    let config = ConfigFile::load().map_err(|e| CliError::Config(e.to_string()))?;
    let client = Arc::new(commands::common::build_client(&config).await?);
    let output = ConsoleOutput::new();
    let ctx = CommandContext {
        output: &output,
        client,
        poll_interval: config.poll_interval(),
    };

    commands::bundles::run(command, &ctx).await
}
