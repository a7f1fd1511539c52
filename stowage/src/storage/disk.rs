//! Directory-backed file cache.
//!
//! Each URL maps to a SHA-256 derived path:
//!
//! ```text
//! <root>/<first two hex chars>/<hash>.body
//! <root>/<first two hex chars>/<hash>.meta   (JSON: url, contentType, status)
//! ```
//!
//! Bodies are written to a temporary file and renamed into place, so a
//! reader never sees a partially written body.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::{CachedFile, FileCache, StorageUsage};
use crate::error::StowageResult;

const BODY_EXTENSION: &str = "body";
const META_EXTENSION: &str = "meta";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMeta {
    url: String,
    content_type: String,
    status: u16,
}

/// [`FileCache`] persisted under a directory.
pub struct DiskFileCache {
    root: PathBuf,
    quota: u64,
}

impl DiskFileCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>, quota: u64) -> StowageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), quota, "Disk file cache opened");
        Ok(Self { root, quota })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn paths(&self, url: &str) -> (PathBuf, PathBuf) {
        let hash = format!("{:x}", Sha256::digest(url.as_bytes()));
        let dir = self.root.join(&hash[..2]);
        (
            dir.join(format!("{}.{}", hash, BODY_EXTENSION)),
            dir.join(format!("{}.{}", hash, META_EXTENSION)),
        )
    }

    /// Every `.meta` file under the root.
    async fn meta_files(&self) -> StowageResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut shards = fs::read_dir(&self.root).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(META_EXTENSION) {
                    found.push(path);
                }
            }
        }
        Ok(found)
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl FileCache for DiskFileCache {
    async fn get(&self, url: &str) -> StowageResult<Option<CachedFile>> {
        let (body_path, meta_path) = self.paths(url);
        let meta = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: FileMeta = match serde_json::from_slice(&meta) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(url = %url, error = %e, "Unreadable cache metadata, treating as absent");
                return Ok(None);
            }
        };
        let body = match fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(CachedFile {
            body,
            content_type: meta.content_type,
            status: meta.status,
        }))
    }

    async fn put(&self, url: &str, file: CachedFile) -> StowageResult<()> {
        let (body_path, meta_path) = self.paths(url);
        if let Some(parent) = body_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = body_path.with_extension("tmp");
        fs::write(&tmp_path, &file.body).await?;
        fs::rename(&tmp_path, &body_path).await?;

        let meta = FileMeta {
            url: url.to_string(),
            content_type: file.content_type,
            status: file.status,
        };
        fs::write(&meta_path, serde_json::to_vec(&meta)?).await?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> StowageResult<bool> {
        let (body_path, meta_path) = self.paths(url);
        let had_meta = remove_if_exists(&meta_path).await?;
        let had_body = remove_if_exists(&body_path).await?;
        Ok(had_meta || had_body)
    }

    async fn delete_all(&self) -> StowageResult<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn list(&self) -> StowageResult<Vec<String>> {
        let mut urls = Vec::new();
        for path in self.meta_files().await? {
            let bytes = fs::read(&path).await?;
            if let Ok(meta) = serde_json::from_slice::<FileMeta>(&bytes) {
                urls.push(meta.url);
            }
        }
        urls.sort();
        Ok(urls)
    }

    async fn query_usage(&self) -> StowageResult<StorageUsage> {
        let mut usage = 0;
        for path in self.meta_files().await? {
            if let Ok(metadata) = fs::metadata(path.with_extension(BODY_EXTENSION)).await {
                usage += metadata.len();
            }
        }
        Ok(StorageUsage {
            usage,
            quota: self.quota,
        })
    }

    async fn is_persisted(&self) -> bool {
        true
    }

    async fn request_persistence(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_keeps_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskFileCache::open(temp_dir.path(), 1_000_000).await.unwrap();
        let url = "https://cdn.example.com/pkg/logo.png";

        let mut file = CachedFile::new(vec![1u8, 2, 3], "image/png");
        file.status = 203;
        cache.put(url, file.clone()).await.unwrap();

        assert_eq!(cache.get(url).await.unwrap(), Some(file));
        assert_eq!(cache.list().await.unwrap(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let url = "https://a.com/__catalog-indices__.json";
        {
            let cache = DiskFileCache::open(temp_dir.path(), 100).await.unwrap();
            cache
                .put(url, CachedFile::new("{}", "application/json"))
                .await
                .unwrap();
        }
        let cache = DiskFileCache::open(temp_dir.path(), 100).await.unwrap();
        assert_eq!(cache.get(url).await.unwrap().unwrap().text(), "{}");
        assert!(cache.is_persisted().await);
    }

    #[tokio::test]
    async fn test_delete_and_usage() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskFileCache::open(temp_dir.path().join("cache"), 500)
            .await
            .unwrap();
        cache
            .put("https://a.com/1", CachedFile::new(vec![0u8; 40], "text/plain"))
            .await
            .unwrap();
        cache
            .put("https://a.com/2", CachedFile::new(vec![0u8; 2], "text/plain"))
            .await
            .unwrap();
        assert_eq!(
            cache.query_usage().await.unwrap(),
            StorageUsage { usage: 42, quota: 500 }
        );

        assert!(cache.delete("https://a.com/1").await.unwrap());
        assert!(!cache.delete("https://a.com/1").await.unwrap());
        assert_eq!(cache.query_usage().await.unwrap().usage, 2);

        cache.delete_all().await.unwrap();
        assert!(cache.list().await.unwrap().is_empty());
        assert!(cache.root().exists());
    }
}
