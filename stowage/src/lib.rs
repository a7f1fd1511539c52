//! Stowage - update and download orchestration for versioned bundles
//!
//! A bundle is a set of files described by a JSON manifest served from a
//! remote origin. This library checks bundles for new versions, computes
//! which files to fetch and which to evict, batches the work into download
//! jobs, retries what failed and keeps a durable catalog of what is
//! installed.
//!
//! # High-Level API
//!
//! [`client::DownloadClient`] runs on five injected adaptors (network,
//! file cache, download manager, catalog storage and message queue).
//! Default adaptors are provided:
//!
//! ```ignore
//! use std::sync::Arc;
//! use stowage::client::{Adaptors, CheckRequest, DownloadClient};
//! use stowage::catalog::FileCacheCatalogStorage;
//! use stowage::config::{ClientConfig, DownloadConfig};
//! use stowage::download::LocalDownloader;
//! use stowage::messages::FileCacheMessageQueue;
//! use stowage::network::ReqwestFetch;
//! use stowage::storage::DiskFileCache;
//!
//! let origin = "https://games.local";
//! let cache = Arc::new(DiskFileCache::open(cache_dir, quota).await?);
//! let network = Arc::new(ReqwestFetch::new()?);
//! let client = DownloadClient::new(
//!     ClientConfig::new(origin),
//!     Adaptors {
//!         network: Arc::clone(&network),
//!         cache: Arc::clone(&cache),
//!         downloader: LocalDownloader::new(network, Arc::clone(&cache), origin, &DownloadConfig::default()),
//!         catalog: FileCacheCatalogStorage::new(Arc::clone(&cache), origin),
//!         messages: FileCacheMessageQueue::new(cache, origin),
//!     },
//! )?;
//!
//! let result = client.check_for_updates(CheckRequest::new(url, 0)).await?;
//! let status = client.execute_updates(&[result], "Update").await?;
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod disk;
pub mod download;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod messages;
pub mod network;
pub mod permissions;
pub mod poller;
pub mod status;
pub mod storage;
pub mod time;
pub mod urls;
pub mod version;

pub use error::{StowageError, StowageResult};
pub use status::Status;

/// Version of the Stowage library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
