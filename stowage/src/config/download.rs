//! Transfer configuration for the network adaptor and local downloader.

use super::file::{DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_DOWNLOAD_TIMEOUT_SECS};

/// Configuration for HTTP transfers.
///
/// # Example
///
/// ```
/// use stowage::config::DownloadConfig;
///
/// let config = DownloadConfig::default();
/// assert_eq!(config.timeout_secs(), 30);
/// assert_eq!(config.concurrency(), 8);
///
/// let config = DownloadConfig::new()
///     .with_timeout_secs(60)
///     .with_concurrency(16);
/// assert_eq!(config.concurrency(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Per-request timeout (in seconds)
    timeout_secs: u64,
    /// Maximum number of concurrent resource fetches per job
    concurrency: usize,
}

impl DownloadConfig {
    /// Create a new download configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = timeout;
        self
    }

    /// Set the maximum number of concurrent fetches. Clamped to at least 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.timeout_secs(), DEFAULT_DOWNLOAD_TIMEOUT_SECS);
        assert_eq!(config.concurrency(), DEFAULT_DOWNLOAD_CONCURRENCY);
        assert_eq!(config, DownloadConfig::new());
    }

    #[test]
    fn test_builder_chain() {
        let config = DownloadConfig::new()
            .with_timeout_secs(45)
            .with_concurrency(64);
        assert_eq!(config.timeout_secs(), 45);
        assert_eq!(config.concurrency(), 64);
    }

    #[test]
    fn test_concurrency_floor() {
        assert_eq!(DownloadConfig::new().with_concurrency(0).concurrency(), 1);
    }
}
