//! Configuration management CLI commands.

use clap::Subcommand;
use stowage::config::{config_file_path, format_size, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration
    Show,

    /// Write a default configuration file if none exists
    Init,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
        ConfigCommands::Show => run_show(),
        ConfigCommands::Init => run_init(),
    }
}

fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load().map_err(|e| CliError::Config(e.to_string()))?;
    for (key, value) in settings(&config) {
        println!("{:<28} {}", key, value);
    }
    Ok(())
}

fn run_init() -> Result<(), CliError> {
    let path = ConfigFile::ensure_exists().map_err(|e| CliError::Config(e.to_string()))?;
    println!("Configuration file: {}", path.display());
    Ok(())
}

/// Flatten a configuration into `section.key` / value pairs.
fn settings(config: &ConfigFile) -> Vec<(&'static str, String)> {
    vec![
        ("client.origin", config.client.origin.clone()),
        ("client.manifest_name", config.client.manifest_name.clone()),
        (
            "client.mini_manifest_name",
            config.client.mini_manifest_name.clone(),
        ),
        (
            "client.default_invalidation",
            config.client.default_invalidation.as_str().to_string(),
        ),
        (
            "storage.directory",
            config.storage.directory.display().to_string(),
        ),
        ("storage.quota", format_size(config.storage.quota)),
        ("storage.reserved", format_size(config.storage.reserved)),
        ("download.timeout", config.download.timeout.to_string()),
        ("download.concurrency", config.download.concurrency.to_string()),
        ("poller.interval_ms", config.poller.interval_ms.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_cover_every_section() {
        let config = ConfigFile::default();
        let settings = settings(&config);
        for section in ["client.", "storage.", "download.", "poller."] {
            assert!(settings.iter().any(|(key, _)| key.starts_with(section)));
        }
        let origin = settings
            .iter()
            .find(|(key, _)| *key == "client.origin")
            .map(|(_, value)| value.clone());
        assert_eq!(origin, Some(config.client.origin));
    }
}
