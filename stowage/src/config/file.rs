//! Configuration file handling for ~/.stowage/config.ini.
//!
//! Loads and saves user configuration with sensible defaults. Parsing lives
//! in [`super::parser`] and serialization in [`super::writer`].

use ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::{ClientConfig, DownloadConfig};
use crate::manifest::InvalidationStrategy;

/// Default manifest file name.
pub const DEFAULT_MANIFEST_NAME: &str = "stowage.json";
/// Default mini-manifest file name.
pub const DEFAULT_MINI_MANIFEST_NAME: &str = "stowage.mini.json";
/// Default origin used as the local storage namespace.
pub const DEFAULT_ORIGIN: &str = "https://stowage.localhost";
/// Quota held back from bundle storage (200 MB).
pub const DEFAULT_RESERVED_BYTES: u64 = 200 * 1024 * 1024;
/// Default storage quota (10 GB).
pub const DEFAULT_STORAGE_QUOTA: u64 = 10 * 1024 * 1024 * 1024;
/// Default per-request timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
/// Default number of concurrent resource fetches per job.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;
/// Default progress poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub client: ClientSettings,
    pub storage: StorageSettings,
    pub download: DownloadSettings,
    pub poller: PollerSettings,
}

/// `[client]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Local storage namespace (absolute http(s) URL)
    pub origin: String,
    pub manifest_name: String,
    pub mini_manifest_name: String,
    /// Either `url-diff` or `purge`
    pub default_invalidation: InvalidationStrategy,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Root directory of the on-disk file cache
    pub directory: PathBuf,
    /// Total bytes the cache may use
    pub quota: u64,
    /// Bytes of the quota held back for the system
    pub reserved: u64,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub concurrency: usize,
}

/// `[poller]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    pub interval_ms: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            client: ClientSettings {
                origin: DEFAULT_ORIGIN.to_string(),
                manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
                mini_manifest_name: DEFAULT_MINI_MANIFEST_NAME.to_string(),
                default_invalidation: InvalidationStrategy::UrlDiff,
            },
            storage: StorageSettings {
                directory: config_directory().join("cache"),
                quota: DEFAULT_STORAGE_QUOTA,
                reserved: DEFAULT_RESERVED_BYTES,
            },
            download: DownloadSettings {
                timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
                concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            },
            poller: PollerSettings {
                interval_ms: DEFAULT_POLL_INTERVAL_MS,
            },
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.stowage/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.client.origin.clone())
            .with_manifest_name(self.client.manifest_name.clone())
            .with_mini_manifest_name(self.client.mini_manifest_name.clone())
            .with_default_invalidation(self.client.default_invalidation)
            .with_reserved_bytes(self.storage.reserved)
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::new()
            .with_timeout_secs(self.download.timeout)
            .with_concurrency(self.download.concurrency)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poller.interval_ms)
    }
}

/// Get the path to the config directory (~/.stowage).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stowage")
}

/// Get the path to the config file (~/.stowage/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.client.origin, DEFAULT_ORIGIN);
        assert_eq!(config.storage.reserved, DEFAULT_RESERVED_BYTES);
        assert_eq!(config.download.timeout, DEFAULT_DOWNLOAD_TIMEOUT_SECS);
        assert!(config.storage.directory.ends_with("cache"));
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp_dir.path().join("nonexistent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.client.origin = "https://arcade.example.com".to_string();
        config.storage.quota = 2 * 1024 * 1024 * 1024;
        config.download.concurrency = 3;
        config.client.default_invalidation = InvalidationStrategy::Purge;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_derived_configs() {
        let mut config = ConfigFile::default();
        config.storage.reserved = 0;
        config.download.timeout = 5;
        config.poller.interval_ms = 50;

        assert_eq!(config.client_config().reserved_bytes(), 0);
        assert_eq!(config.download_config().timeout_secs(), 5);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }
}
