//! Download client configuration.

use super::file::{
    DEFAULT_MANIFEST_NAME, DEFAULT_MINI_MANIFEST_NAME, DEFAULT_RESERVED_BYTES,
};
use crate::manifest::InvalidationStrategy;

/// Configuration for a [`DownloadClient`](crate::client::DownloadClient).
///
/// The origin is the client's own storage namespace: catalog and
/// download-index records are kept under it.
///
/// # Example
///
/// ```
/// use stowage::config::ClientConfig;
///
/// let config = ClientConfig::new("https://games.local")
///     .with_manifest_name("bundle.json")
///     .with_reserved_bytes(0);
/// assert_eq!(config.origin(), "https://games.local");
/// assert_eq!(config.manifest_name(), "bundle.json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    origin: String,
    manifest_name: String,
    mini_manifest_name: String,
    default_invalidation: InvalidationStrategy,
    reserved_bytes: u64,
}

impl ClientConfig {
    /// Create a configuration for the given origin with default values.
    /// A trailing slash on the origin is dropped.
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            origin: crate::urls::remove_slash_at_end(&origin).to_string(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            mini_manifest_name: DEFAULT_MINI_MANIFEST_NAME.to_string(),
            default_invalidation: InvalidationStrategy::UrlDiff,
            reserved_bytes: DEFAULT_RESERVED_BYTES,
        }
    }

    /// File name every canonical manifest URL must end with.
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// File name of the version-only mini manifest next to the manifest.
    pub fn with_mini_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.mini_manifest_name = name.into();
        self
    }

    /// Invalidation applied to files that declare `default`.
    pub fn with_default_invalidation(mut self, invalidation: InvalidationStrategy) -> Self {
        self.default_invalidation = invalidation;
        self
    }

    /// Bytes of cache quota held back for the system.
    pub fn with_reserved_bytes(mut self, bytes: u64) -> Self {
        self.reserved_bytes = bytes;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    pub fn mini_manifest_name(&self) -> &str {
        &self.mini_manifest_name
    }

    pub fn default_invalidation(&self) -> InvalidationStrategy {
        self.default_invalidation
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("https://a.com/");
        assert_eq!(config.origin(), "https://a.com");
        assert_eq!(config.manifest_name(), DEFAULT_MANIFEST_NAME);
        assert_eq!(config.mini_manifest_name(), DEFAULT_MINI_MANIFEST_NAME);
        assert_eq!(config.default_invalidation(), InvalidationStrategy::UrlDiff);
        assert_eq!(config.reserved_bytes(), 200 * 1024 * 1024);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("https://a.com")
            .with_mini_manifest_name("b.mini.json")
            .with_default_invalidation(InvalidationStrategy::Purge)
            .with_reserved_bytes(1);
        assert_eq!(config.mini_manifest_name(), "b.mini.json");
        assert_eq!(config.default_invalidation(), InvalidationStrategy::Purge);
        assert_eq!(config.reserved_bytes(), 1);
    }
}
