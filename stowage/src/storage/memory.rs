//! In-memory file cache.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{CachedFile, FileCache, StorageUsage};
use crate::config::DEFAULT_STORAGE_QUOTA;
use crate::error::StowageResult;

/// Process-local [`FileCache`].
///
/// Nothing survives the process. The quota is only reported through
/// [`FileCache::query_usage`], writes beyond it are not refused.
pub struct MemoryFileCache {
    files: RwLock<HashMap<String, CachedFile>>,
    quota: u64,
}

impl MemoryFileCache {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_STORAGE_QUOTA)
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            quota,
        }
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

impl Default for MemoryFileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FileCache for MemoryFileCache {
    async fn get(&self, url: &str) -> StowageResult<Option<CachedFile>> {
        Ok(self.files.read().await.get(url).cloned())
    }

    async fn put(&self, url: &str, file: CachedFile) -> StowageResult<()> {
        self.files.write().await.insert(url.to_string(), file);
        Ok(())
    }

    async fn delete(&self, url: &str) -> StowageResult<bool> {
        Ok(self.files.write().await.remove(url).is_some())
    }

    async fn delete_all(&self) -> StowageResult<()> {
        self.files.write().await.clear();
        Ok(())
    }

    async fn list(&self) -> StowageResult<Vec<String>> {
        let mut urls: Vec<String> = self.files.read().await.keys().cloned().collect();
        urls.sort();
        Ok(urls)
    }

    async fn query_usage(&self) -> StowageResult<StorageUsage> {
        let usage = self.files.read().await.values().map(CachedFile::len).sum();
        Ok(StorageUsage {
            usage,
            quota: self.quota,
        })
    }

    async fn is_persisted(&self) -> bool {
        false
    }

    async fn request_persistence(&self) -> bool {
        false
    }
}
