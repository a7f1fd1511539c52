//! Configuration types for stowage components.
//!
//! [`ConfigFile`] is the INI-backed user configuration. The runtime structs
//! ([`ClientConfig`], [`DownloadConfig`]) are plain builders derived from it
//! and can be built directly by embedders that skip the file.
//!
//! # Example
//!
//! ```
//! use stowage::config::{ClientConfig, DownloadConfig};
//!
//! let client = ClientConfig::new("https://games.example.com")
//!     .with_reserved_bytes(0);
//! let download = DownloadConfig::new().with_concurrency(4);
//! assert_eq!(client.origin(), "https://games.example.com");
//! assert_eq!(download.concurrency(), 4);
//! ```

mod client;
mod download;
mod file;
mod parser;
mod size;
mod writer;

pub use client::ClientConfig;
pub use download::DownloadConfig;
pub use file::{
    config_directory, config_file_path, ClientSettings, ConfigFile, ConfigFileError,
    DownloadSettings, PollerSettings, StorageSettings, DEFAULT_DOWNLOAD_CONCURRENCY,
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_MANIFEST_NAME, DEFAULT_MINI_MANIFEST_NAME,
    DEFAULT_ORIGIN, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESERVED_BYTES, DEFAULT_STORAGE_QUOTA,
};
pub use size::{format_size, parse_size, readable_size, Size, SizeParseError};
