//! File cache port and its default adaptors.
//!
//! Every file the engine stores (bundle resources, manifests, catalog and
//! download indices, error indices, queued messages) goes through a
//! [`FileCache`] keyed by absolute URL.
//!
//! # Adaptors
//!
//! - [`MemoryFileCache`]: process-local map, used in tests and for
//!   ephemeral embedders
//! - [`DiskFileCache`]: content stored under a directory, one file per URL

mod disk;
mod memory;

pub use disk::DiskFileCache;
pub use memory::MemoryFileCache;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StowageError, StowageResult};

/// A stored response body with the metadata needed to serve it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub body: Vec<u8>,
    pub content_type: String,
    pub status: u16,
}

impl CachedFile {
    pub fn new(body: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
            status: 200,
        }
    }

    /// Serialize `value` as an `application/json` file.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?, "application/json"))
    }

    pub fn len(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Storage consumption as reported by a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageUsage {
    /// Bytes currently stored.
    pub usage: u64,
    /// Bytes the cache may use in total.
    pub quota: u64,
}

/// URL-keyed file storage.
///
/// Implementations must be safe to share across tasks. Keys are absolute
/// URLs; no normalization is applied.
pub trait FileCache: Send + Sync {
    /// Fetch a stored file, `None` when absent.
    fn get(&self, url: &str) -> impl Future<Output = StowageResult<Option<CachedFile>>> + Send;

    /// Store a file, replacing any previous entry.
    fn put(&self, url: &str, file: CachedFile) -> impl Future<Output = StowageResult<()>> + Send;

    /// Remove a file. Returns `false` when nothing was stored at `url`.
    fn delete(&self, url: &str) -> impl Future<Output = StowageResult<bool>> + Send;

    /// Remove every stored file.
    fn delete_all(&self) -> impl Future<Output = StowageResult<()>> + Send;

    /// URLs of every stored file.
    fn list(&self) -> impl Future<Output = StowageResult<Vec<String>>> + Send;

    fn query_usage(&self) -> impl Future<Output = StowageResult<StorageUsage>> + Send;

    /// Whether stored data survives restarts.
    fn is_persisted(&self) -> impl Future<Output = bool> + Send;

    /// Ask the backing store to keep data across restarts.
    fn request_persistence(&self) -> impl Future<Output = bool> + Send;
}

impl<T: FileCache> FileCache for Arc<T> {
    fn get(&self, url: &str) -> impl Future<Output = StowageResult<Option<CachedFile>>> + Send {
        (**self).get(url)
    }

    fn put(&self, url: &str, file: CachedFile) -> impl Future<Output = StowageResult<()>> + Send {
        (**self).put(url, file)
    }

    fn delete(&self, url: &str) -> impl Future<Output = StowageResult<bool>> + Send {
        (**self).delete(url)
    }

    fn delete_all(&self) -> impl Future<Output = StowageResult<()>> + Send {
        (**self).delete_all()
    }

    fn list(&self) -> impl Future<Output = StowageResult<Vec<String>>> + Send {
        (**self).list()
    }

    fn query_usage(&self) -> impl Future<Output = StowageResult<StorageUsage>> + Send {
        (**self).query_usage()
    }

    fn is_persisted(&self) -> impl Future<Output = bool> + Send {
        (**self).is_persisted()
    }

    fn request_persistence(&self) -> impl Future<Output = bool> + Send {
        (**self).request_persistence()
    }
}

/// Read and decode a JSON record. Absent files yield `None`; undecodable
/// files are a [`StowageError::CorruptRecord`].
pub async fn read_json<C, T>(cache: &C, url: &str) -> StowageResult<Option<T>>
where
    C: FileCache,
    T: DeserializeOwned,
{
    let Some(file) = cache.get(url).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&file.body)
        .map(Some)
        .map_err(|source| StowageError::CorruptRecord {
            url: url.to_string(),
            source,
        })
}

/// Encode and store a JSON record.
pub async fn write_json<C, T>(cache: &C, url: &str, value: &T) -> StowageResult<()>
where
    C: FileCache,
    T: Serialize,
{
    let file = CachedFile::json(value).map_err(|source| StowageError::CorruptRecord {
        url: url.to_string(),
        source,
    })?;
    cache.put(url, file).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = MemoryFileCache::new();
        let url = "https://a.com/record.json";
        assert_eq!(read_json::<_, Record>(&cache, url).await.unwrap(), None);

        let record = Record {
            name: "pkg".to_string(),
        };
        write_json(&cache, url, &record).await.unwrap();
        let stored = cache.get(url).await.unwrap().unwrap();
        assert_eq!(stored.content_type, "application/json");
        assert_eq!(read_json::<_, Record>(&cache, url).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let cache = MemoryFileCache::new();
        let url = "https://a.com/record.json";
        cache
            .put(url, CachedFile::new("not json", "text/plain"))
            .await
            .unwrap();
        let result = read_json::<_, Record>(&cache, url).await;
        assert!(matches!(result, Err(StowageError::CorruptRecord { .. })));
    }

    #[tokio::test]
    async fn test_arc_cache_shares_state() {
        let cache = Arc::new(MemoryFileCache::new());
        let clone = Arc::clone(&cache);
        clone
            .put("https://a.com/x", CachedFile::new("x", "text/plain"))
            .await
            .unwrap();
        assert!(cache.get("https://a.com/x").await.unwrap().is_some());
    }
}
