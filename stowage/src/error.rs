//! Error types for infrastructure failures.
//!
//! Expected outcomes of client operations are reported through
//! [`Status`](crate::status::Status). `StowageError` only covers failures of
//! the injected adaptors themselves (cache I/O, corrupt persisted records)
//! and construction-time misuse.

use std::io;

use thiserror::Error;

use crate::network::FetchError;

/// Errors raised by the storage layer and client plumbing.
#[derive(Debug, Error)]
pub enum StowageError {
    /// Client origin is not an absolute http(s) URL.
    #[error("origin must be a full url starting with http:// or https://, got '{0}'")]
    InvalidOrigin(String),

    /// File cache I/O failure.
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted record could not be (de)serialized.
    #[error("corrupt record at {url}: {source}")]
    CorruptRecord {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization failure outside of a specific record.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network adaptor failure surfaced outside the status taxonomy.
    #[error("network error: {0}")]
    Network(#[from] FetchError),

    /// Download manager refused or failed an operation.
    #[error("download manager error: {0}")]
    Downloader(String),
}

/// Result alias for storage and client plumbing.
pub type StowageResult<T> = Result<T, StowageError>;
