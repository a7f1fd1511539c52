//! The download client.
//!
//! [`DownloadClient`] ties the ports together: it checks bundles for updates,
//! turns accepted updates into download jobs, retries failed jobs, applies
//! completion messages and answers catalog queries.
//!
//! # State
//!
//! The catalog and the live download collection are cached in a
//! `StateContext` behind a tokio mutex. Each is loaded on first access,
//! written through on every mutation and dropped by
//! [`refresh_catalog`](DownloadClient::refresh_catalog) /
//! [`refresh_download_indices`](DownloadClient::refresh_download_indices).
//!
//! # Status reporting
//!
//! Operations return `Ok(Status)` for every expected outcome, including
//! refusals. `Err` means an adaptor failed.

mod check;
mod execute;
mod live;
mod reconcile;
mod remove;
mod result;
mod retry;

pub use result::{CheckRequest, UpdateCheckResult, Versions};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogIndexStorage, CatalogRecord, CatalogState, NO_DOWNLOAD_QUEUED};
use crate::config::ClientConfig;
use crate::disk::DiskInfo;
use crate::download::{
    download_indices_url, DownloadIndexCollection, DownloadManager, DownloadState,
};
use crate::error::{StowageError, StowageResult};
use crate::manifest::{validate_manifest, Manifest, NULL_FIELD};
use crate::messages::MessageConsumer;
use crate::network::{fetch_with_retry, FetchRequest, NetworkFetch};
use crate::poller::{Progress, ProgressSource};
use crate::status::Status;
use crate::storage::{read_json, write_json, CachedFile, FileCache};
use crate::time::now_millis;
use crate::urls::{add_slash_to_end, parse_http_url};

/// Attempts made when caching the root document.
const ROOT_DOCUMENT_ATTEMPTS: usize = 3;

/// The adaptors a [`DownloadClient`] runs on.
pub struct Adaptors<N, C, D, S, M> {
    pub network: N,
    pub cache: C,
    pub downloader: D,
    pub catalog: S,
    pub messages: M,
}

#[derive(Default)]
struct StateContext {
    catalog: Option<Vec<CatalogRecord>>,
    downloads: Option<DownloadIndexCollection>,
}

/// Downloader state of one bundle, with the versions it moves between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDownloadState {
    #[serde(flatten)]
    pub state: DownloadState,
    pub version: String,
    pub previous_version: String,
}

/// Update and download orchestrator.
pub struct DownloadClient<N, C, D, S, M> {
    network: N,
    cache: C,
    downloader: D,
    catalog: S,
    messages: M,
    config: ClientConfig,
    state: Mutex<StateContext>,
}

impl<N, C, D, S, M> DownloadClient<N, C, D, S, M>
where
    N: NetworkFetch,
    C: FileCache,
    D: DownloadManager,
    S: CatalogIndexStorage,
    M: MessageConsumer,
{
    /// Create a client.
    ///
    /// # Errors
    ///
    /// [`StowageError::InvalidOrigin`] when the configured origin is not an
    /// absolute http(s) URL.
    pub fn new(config: ClientConfig, adaptors: Adaptors<N, C, D, S, M>) -> StowageResult<Self> {
        if parse_http_url(config.origin()).is_none() {
            return Err(StowageError::InvalidOrigin(config.origin().to_string()));
        }
        info!(origin = %config.origin(), manifest = %config.manifest_name(), "Download client created");
        Ok(Self {
            network: adaptors.network,
            cache: adaptors.cache,
            downloader: adaptors.downloader,
            catalog: adaptors.catalog,
            messages: adaptors.messages,
            config,
            state: Mutex::new(StateContext::default()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn origin(&self) -> &str {
        self.config.origin()
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    // ---------------------------------------------------------------------
    // Catalog
    // ---------------------------------------------------------------------

    /// Every catalog record.
    pub async fn catalog_records(&self) -> StowageResult<Vec<CatalogRecord>> {
        let mut state = self.state.lock().await;
        if state.catalog.is_none() {
            state.catalog = Some(self.catalog.get_all().await?);
        }
        Ok(state.catalog.clone().unwrap_or_default())
    }

    pub async fn get_catalog_record(&self, canonical_url: &str) -> StowageResult<Option<CatalogRecord>> {
        Ok(self
            .catalog_records()
            .await?
            .into_iter()
            .find(|r| r.canonical_url == canonical_url))
    }

    /// Drop the cached catalog and reload it from storage.
    pub async fn refresh_catalog(&self) -> StowageResult<Vec<CatalogRecord>> {
        let records = self.catalog.get_all().await?;
        self.state.lock().await.catalog = Some(records.clone());
        Ok(records)
    }

    async fn put_catalog_record(&self, record: CatalogRecord) -> StowageResult<CatalogRecord> {
        let stored = self.catalog.put_index(record).await?;
        let mut state = self.state.lock().await;
        if let Some(records) = state.catalog.as_mut() {
            match records
                .iter_mut()
                .find(|r| r.canonical_url == stored.canonical_url)
            {
                Some(existing) => *existing = stored.clone(),
                None => records.push(stored.clone()),
            }
        }
        Ok(stored)
    }

    async fn delete_catalog_record(&self, canonical_url: &str) -> StowageResult<bool> {
        let removed = self.catalog.delete_index(canonical_url).await?;
        if let Some(records) = self.state.lock().await.catalog.as_mut() {
            records.retain(|r| r.canonical_url != canonical_url);
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Download indices
    // ---------------------------------------------------------------------

    /// Snapshot of the live download collection.
    pub async fn download_indices(&self) -> StowageResult<DownloadIndexCollection> {
        let mut state = self.state.lock().await;
        if state.downloads.is_none() {
            state.downloads = Some(self.load_download_indices().await?);
        }
        Ok(state.downloads.clone().unwrap_or_default())
    }

    /// Drop the cached download collection and reload it from storage.
    pub async fn refresh_download_indices(&self) -> StowageResult<DownloadIndexCollection> {
        let collection = self.load_download_indices().await?;
        self.state.lock().await.downloads = Some(collection.clone());
        Ok(collection)
    }

    async fn load_download_indices(&self) -> StowageResult<DownloadIndexCollection> {
        Ok(read_json(&self.cache, &download_indices_url(self.origin()))
            .await?
            .unwrap_or_else(|| DownloadIndexCollection::new(now_millis())))
    }

    /// Apply `f` to the download collection and write it through.
    async fn update_download_indices<F, R>(&self, f: F) -> StowageResult<R>
    where
        F: FnOnce(&mut DownloadIndexCollection, u64) -> R,
    {
        let mut state = self.state.lock().await;
        let mut collection = match state.downloads.take() {
            Some(collection) => collection,
            None => self.load_download_indices().await?,
        };
        let now = now_millis();
        let outcome = f(&mut collection, now);
        collection.saved_at = now;
        let written = write_json(&self.cache, &download_indices_url(self.origin()), &collection).await;
        state.downloads = Some(collection);
        written?;
        Ok(outcome)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Storage budget: cache usage plus pending download bytes against the
    /// quota minus the reserved margin.
    pub async fn disk_info(&self) -> StowageResult<DiskInfo> {
        let usage = self.cache.query_usage().await?;
        let pending = self.download_indices().await?.total_bytes;
        Ok(DiskInfo::new(
            usage.usage,
            pending,
            usage.quota,
            self.config.reserved_bytes(),
        ))
    }

    /// The manifest stored for the bundle at `resolved_url`.
    pub async fn get_cached_manifest(&self, resolved_url: &str) -> StowageResult<Option<Manifest>> {
        self.cached_manifest_at(resolved_url, self.config.manifest_name())
            .await
    }

    async fn cached_manifest_at(
        &self,
        resolved_url: &str,
        manifest_name: &str,
    ) -> StowageResult<Option<Manifest>> {
        let url = format!("{}{}", add_slash_to_end(resolved_url), manifest_name);
        let Some(file) = self.cache.get(&url).await? else {
            return Ok(None);
        };
        let Ok(raw) = serde_json::from_slice::<serde_json::Value>(&file.body) else {
            warn!(url = %url, "Stored manifest is not JSON");
            return Ok(None);
        };
        Ok(Some(validate_manifest(&raw).manifest))
    }

    /// A file from the cache, by absolute URL.
    pub async fn get_cached_file(&self, url: &str) -> StowageResult<Option<CachedFile>> {
        self.cache.get(url).await
    }

    /// Downloader progress for a bundle with a queued job, tagged with the
    /// versions the job moves between.
    pub async fn get_download_state(
        &self,
        canonical_url: &str,
    ) -> StowageResult<Option<BundleDownloadState>> {
        let Some(record) = self.get_catalog_record(canonical_url).await? else {
            return Ok(None);
        };
        if record.download_id == NO_DOWNLOAD_QUEUED {
            return Ok(None);
        }
        let downloads = self.download_indices().await?;
        let Some(segment) = downloads
            .find_by_canonical_url(canonical_url)
            .and_then(|index| index.segment(canonical_url))
        else {
            return Ok(None);
        };
        let Some(state) = self.downloader.get_download_state(&record.download_id).await? else {
            return Ok(None);
        };
        Ok(Some(BundleDownloadState {
            state,
            version: segment.version.clone(),
            previous_version: segment.previous_version.clone(),
        }))
    }

    /// Where a bundle stands, as reported to progress listeners.
    pub async fn bundle_progress(&self, canonical_url: &str) -> StowageResult<Progress> {
        if let Some(state) = self.get_download_state(canonical_url).await? {
            return Ok(Progress::Downloading(state));
        }
        if let Some(record) = self.get_catalog_record(canonical_url).await? {
            if record.state.is_retryable() {
                return Ok(Progress::Failed(record.state));
            }
        }
        if self
            .download_indices()
            .await?
            .find_by_canonical_url(canonical_url)
            .is_some()
        {
            return Ok(Progress::Installing);
        }
        Ok(Progress::Finished)
    }

    // ---------------------------------------------------------------------
    // Whole-cache operations
    // ---------------------------------------------------------------------

    /// Fetch `{origin}/` and store it at `{origin}/offline.html`.
    pub async fn cache_root_document_fallback(&self) -> StowageResult<Status> {
        let root_url = format!("{}/", self.origin());
        let response = match fetch_with_retry(
            &self.network,
            FetchRequest::get(root_url.clone()),
            ROOT_DOCUMENT_ATTEMPTS,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %root_url, error = %e, "Root document request failed");
                return Ok(Status::NetworkError);
            }
        };
        if !response.is_success() {
            warn!(url = %root_url, status = response.status, "Root document returned error status");
            return Ok(Status::BadHttpCode);
        }
        if response.content_type() != Some("text/html") {
            warn!(
                url = %root_url,
                content_type = ?response.content_type(),
                "Root document is not text/html"
            );
            return Ok(Status::EncodingNotAcceptable);
        }

        let fallback_url = format!("{}/offline.html", self.origin());
        let file = CachedFile {
            body: response.body,
            content_type: "text/html".to_string(),
            status: response.status,
        };
        self.cache.put(&fallback_url, file).await?;
        info!(url = %fallback_url, "Root document cached");
        Ok(Status::Cached)
    }

    /// Delete every stored file and forget cached state.
    pub async fn uninstall_all_assets(&self) -> StowageResult<Status> {
        self.cache.delete_all().await?;
        *self.state.lock().await = StateContext::default();
        info!(origin = %self.origin(), "All assets uninstalled");
        Ok(Status::Deleted)
    }

    // ---------------------------------------------------------------------
    // Shared helpers
    // ---------------------------------------------------------------------

    /// Catalog record describing the offered manifest of `result`.
    fn record_from_result(
        &self,
        result: &UpdateCheckResult,
        manifest: &Manifest,
        state: CatalogState,
        download_id: &str,
    ) -> CatalogRecord {
        let entry = if manifest.entry == NULL_FIELD || manifest.entry.is_empty() {
            NULL_FIELD.to_string()
        } else {
            format!("{}{}", result.resolved_url, manifest.entry)
        };
        CatalogRecord {
            tag: result.tag,
            name: manifest.name.clone(),
            logo: manifest.crate_logo_url.clone(),
            resolved_url: result.resolved_url.clone(),
            canonical_url: result.canonical_url.clone(),
            manifest_name: self.config.manifest_name().to_string(),
            bytes: result.manifest_total_bytes(),
            entry,
            version: manifest.version.clone(),
            permissions: manifest.permissions.clone(),
            state,
            download_id: download_id.to_string(),
            created: 0,
            updated: 0,
        }
    }

    /// Store the offered manifest at `{resolvedUrl}{manifestName}`.
    async fn write_manifest(&self, result: &UpdateCheckResult, manifest: &Manifest) -> StowageResult<()> {
        let url = format!("{}{}", result.resolved_url, self.config.manifest_name());
        debug!(url = %url, version = %manifest.version, "Writing manifest");
        write_json(&self.cache, &url, manifest).await
    }

    /// Delete a bundle's files, and its manifest when `include_manifest`.
    async fn delete_bundle_files(&self, record: &CatalogRecord, include_manifest: bool) -> StowageResult<()> {
        let base = add_slash_to_end(&record.resolved_url);
        if let Some(manifest) = self
            .cached_manifest_at(&record.resolved_url, &record.manifest_name)
            .await?
        {
            for file in &manifest.files {
                self.cache.delete(&format!("{}{}", base, file.name)).await?;
            }
        }
        if include_manifest {
            self.cache
                .delete(&format!("{}{}", base, record.manifest_name))
                .await?;
        }
        Ok(())
    }
}

impl<N, C, D, S, M> ProgressSource for DownloadClient<N, C, D, S, M>
where
    N: NetworkFetch + 'static,
    C: FileCache + 'static,
    D: DownloadManager + 'static,
    S: CatalogIndexStorage + 'static,
    M: MessageConsumer + 'static,
{
    async fn progress(&self, canonical_url: &str) -> StowageResult<Progress> {
        self.bundle_progress(canonical_url).await
    }
}
