//! Catalog persistence port and its file-cache adaptor.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::record::{CatalogIndices, CatalogRecord};
use crate::error::StowageResult;
use crate::storage::{read_json, write_json, FileCache};
use crate::time::now_millis;
use crate::urls::remove_slash_at_end;

/// URL of the persisted catalog for `origin`.
pub fn catalog_indices_url(origin: &str) -> String {
    format!("{}/__catalog-indices__.json", remove_slash_at_end(origin))
}

/// Durable storage for catalog records, keyed by canonical URL.
pub trait CatalogIndexStorage: Send + Sync {
    /// Every stored record, in insertion order.
    fn get_all(&self) -> impl Future<Output = StowageResult<Vec<CatalogRecord>>> + Send;

    fn get_index(
        &self,
        canonical_url: &str,
    ) -> impl Future<Output = StowageResult<Option<CatalogRecord>>> + Send;

    /// Insert or replace a record. Returns the record as stored, with its
    /// `created`/`updated` timestamps filled in.
    fn put_index(
        &self,
        record: CatalogRecord,
    ) -> impl Future<Output = StowageResult<CatalogRecord>> + Send;

    /// Remove a record. Returns `false` if none was stored.
    fn delete_index(&self, canonical_url: &str) -> impl Future<Output = StowageResult<bool>> + Send;
}

impl<T: CatalogIndexStorage> CatalogIndexStorage for Arc<T> {
    fn get_all(&self) -> impl Future<Output = StowageResult<Vec<CatalogRecord>>> + Send {
        (**self).get_all()
    }

    fn get_index(
        &self,
        canonical_url: &str,
    ) -> impl Future<Output = StowageResult<Option<CatalogRecord>>> + Send {
        (**self).get_index(canonical_url)
    }

    fn put_index(
        &self,
        record: CatalogRecord,
    ) -> impl Future<Output = StowageResult<CatalogRecord>> + Send {
        (**self).put_index(record)
    }

    fn delete_index(&self, canonical_url: &str) -> impl Future<Output = StowageResult<bool>> + Send {
        (**self).delete_index(canonical_url)
    }
}

/// Stores the whole [`CatalogIndices`] collection as one JSON file in a
/// [`FileCache`].
///
/// Mutations are read-modify-write under an internal lock, so concurrent
/// callers sharing one instance never lose updates.
pub struct FileCacheCatalogStorage<C> {
    cache: C,
    url: String,
    lock: Mutex<()>,
}

impl<C: FileCache> FileCacheCatalogStorage<C> {
    pub fn new(cache: C, origin: &str) -> Self {
        Self {
            cache,
            url: catalog_indices_url(origin),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> StowageResult<CatalogIndices> {
        Ok(read_json(&self.cache, &self.url)
            .await?
            .unwrap_or_else(|| CatalogIndices::new(now_millis())))
    }

    async fn save(&self, indices: &mut CatalogIndices) -> StowageResult<()> {
        indices.saved_at = now_millis();
        write_json(&self.cache, &self.url, indices).await?;
        debug!(url = %self.url, records = indices.records.len(), "Catalog saved");
        Ok(())
    }
}

impl<C: FileCache> CatalogIndexStorage for FileCacheCatalogStorage<C> {
    async fn get_all(&self) -> StowageResult<Vec<CatalogRecord>> {
        Ok(self.load().await?.records)
    }

    async fn get_index(&self, canonical_url: &str) -> StowageResult<Option<CatalogRecord>> {
        Ok(self.load().await?.find(canonical_url).cloned())
    }

    async fn put_index(&self, record: CatalogRecord) -> StowageResult<CatalogRecord> {
        let _guard = self.lock.lock().await;
        let mut indices = self.load().await?;
        let stored = indices.upsert(record, now_millis());
        self.save(&mut indices).await?;
        Ok(stored)
    }

    async fn delete_index(&self, canonical_url: &str) -> StowageResult<bool> {
        let _guard = self.lock.lock().await;
        let mut indices = self.load().await?;
        if !indices.remove(canonical_url, now_millis()) {
            return Ok(false);
        }
        self.save(&mut indices).await?;
        Ok(true)
    }
}
