//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use stowage::{Status, StowageError};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Cache, network or downloader failure
    Client(StowageError),
    /// An operation finished with an error status
    Operation { operation: String, status: Status },
    /// A download job failed while being watched
    Download(String),
    /// A destructive command was not confirmed
    NotConfirmed(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Operation {
                status: Status::InsufficentDiskSpace,
                ..
            } => {
                eprintln!();
                eprintln!("Free space with 'stowage remove <url>' or raise the");
                eprintln!("quota in the [storage] section of config.ini.");
            }
            CliError::Operation {
                status: Status::UpdateRetryImpossible | Status::ErrorIndexNotFound,
                ..
            } => {
                eprintln!();
                eprintln!("Only bundles listed as update-failed or update-aborted");
                eprintln!("by 'stowage list' can be retried.");
            }
            CliError::Client(StowageError::InvalidOrigin(_)) => {
                eprintln!();
                eprintln!("Set 'origin' in the [client] section of config.ini,");
                eprintln!("see 'stowage config path'.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Client(e) => write!(f, "{}", e),
            CliError::Operation { operation, status } => {
                write!(f, "{} failed: {} ({})", operation, status.name(), status.code())
            }
            CliError::Download(msg) => write!(f, "Download failed: {}", msg),
            CliError::NotConfirmed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Client(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StowageError> for CliError {
    fn from(e: StowageError) -> Self {
        CliError::Client(e)
    }
}
