//! Turning accepted update checks into one download job.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DownloadClient, UpdateCheckResult};
use crate::catalog::{CatalogIndexStorage, CatalogState, NO_DOWNLOAD_QUEUED};
use crate::download::{
    create_resource_map, DownloadIndex, DownloadManager, QueueOptions, Segment,
};
use crate::error::{StowageError, StowageResult};
use crate::messages::MessageConsumer;
use crate::network::NetworkFetch;
use crate::status::Status;
use crate::storage::FileCache;

impl<N, C, D, S, M> DownloadClient<N, C, D, S, M>
where
    N: NetworkFetch,
    C: FileCache,
    D: DownloadManager,
    S: CatalogIndexStorage,
    M: MessageConsumer,
{
    /// Queue every available update in `results` as a single job titled
    /// `title`.
    ///
    /// Refusals leave no trace. Results without a new manifest are skipped.
    /// If the downloader will not take the job, the bundles are left
    /// `update-aborted` with their segments parked for a retry.
    pub async fn execute_updates(&self, results: &[UpdateCheckResult], title: &str) -> StowageResult<Status> {
        let updates = match self.accept_updates(results).await? {
            Ok(updates) => updates,
            Err(status) => {
                info!(status = %status, results = results.len(), "Updates refused");
                return Ok(status);
            }
        };

        if updates.iter().all(|r| r.downloadable_resources.is_empty()) {
            for result in &updates {
                self.install_without_download(result).await?;
            }
            info!(bundles = updates.len(), "Updates had nothing to download");
            return Ok(Status::NoDownloadbleResources);
        }

        let job_id = Uuid::new_v4().to_string();
        let mut index = DownloadIndex::new(job_id.clone(), title);
        index.segments = updates.iter().map(|r| segment_for(r)).collect();
        index.bytes = index.segments.iter().map(|s| s.bytes).sum();
        let urls = index.request_urls();
        let download_total = index.bytes;

        self.update_download_indices(|collection, now| collection.upsert(index, now))
            .await?;

        for result in &updates {
            let Some(manifest) = result.new_manifest.as_ref() else {
                continue;
            };
            self.write_manifest(result, manifest).await?;
            self.put_catalog_record(self.record_from_result(
                result,
                manifest,
                CatalogState::Updating,
                &job_id,
            ))
            .await?;
            for resource in &result.resources_to_delete {
                self.cache.delete(&resource.storage_url).await?;
            }
        }

        let options = QueueOptions {
            title: title.to_string(),
            download_total,
        };
        let resources = urls.len();
        if !self.downloader.queue_download(&job_id, urls, options).await? {
            warn!(job_id = %job_id, "Downloader refused the job");
            self.abort_job(&job_id).await?;
            return Err(StowageError::Downloader(format!("job {} was not queued", job_id)));
        }
        info!(
            job_id = %job_id,
            bundles = updates.len(),
            resources = resources,
            bytes = download_total,
            "Updates queued"
        );
        Ok(Status::UpdateQueued)
    }

    /// Run the acceptance checks. `Err(status)` is the refusal to report.
    async fn accept_updates<'a>(
        &self,
        results: &'a [UpdateCheckResult],
    ) -> StowageResult<Result<Vec<&'a UpdateCheckResult>, Status>> {
        if results.is_empty() {
            return Ok(Err(Status::ZeroUpdatesProvided));
        }
        if results.iter().any(UpdateCheckResult::error_occurred) {
            return Ok(Err(Status::UpdateImpossible));
        }
        let updates: Vec<&UpdateCheckResult> =
            results.iter().filter(|r| r.update_available()).collect();
        if updates.is_empty() {
            return Ok(Err(Status::UpdateNotAvailable));
        }

        let bytes: u64 = updates.iter().map(|r| r.bytes_to_download()).sum();
        let disk = self.disk_info().await?;
        if !disk.enough_space(bytes) {
            debug!(bytes = bytes, disk = %disk, "Not enough space for updates");
            return Ok(Err(Status::InsufficentDiskSpace));
        }

        let downloads = self.download_indices().await?;
        if updates
            .iter()
            .any(|r| downloads.find_by_canonical_url(&r.canonical_url).is_some())
        {
            return Ok(Err(Status::UpdateAlreadyQueued));
        }

        for result in &updates {
            let Some(record) = self.get_catalog_record(&result.canonical_url).await? else {
                continue;
            };
            if record.download_id == NO_DOWNLOAD_QUEUED {
                continue;
            }
            if self
                .downloader
                .get_download_state(&record.download_id)
                .await?
                .is_some()
            {
                warn!(
                    canonical_url = %result.canonical_url,
                    job_id = %record.download_id,
                    "Downloader still reports a job the client no longer tracks"
                );
                return Ok(Err(Status::DownloadManagerUnsyncedState));
            }
        }
        Ok(Ok(updates))
    }

    /// Record an update whose files are all already in place.
    async fn install_without_download(&self, result: &UpdateCheckResult) -> StowageResult<()> {
        let Some(manifest) = result.new_manifest.as_ref() else {
            return Ok(());
        };
        self.write_manifest(result, manifest).await?;
        for resource in &result.resources_to_delete {
            self.cache.delete(&resource.storage_url).await?;
        }
        self.put_catalog_record(self.record_from_result(
            result,
            manifest,
            CatalogState::Cached,
            NO_DOWNLOAD_QUEUED,
        ))
        .await?;
        Ok(())
    }
}

/// Download segment for one accepted result.
pub(super) fn segment_for(result: &UpdateCheckResult) -> Segment {
    let versions = result.versions();
    Segment {
        name: result
            .new_manifest
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_default(),
        map: create_resource_map(&result.downloadable_resources),
        bytes: result.bytes_to_download(),
        version: versions.new,
        previous_version: versions.old,
        resolved_url: result.resolved_url.clone(),
        canonical_url: result.canonical_url.clone(),
        resources_to_delete: result
            .resources_to_delete
            .iter()
            .map(|r| r.storage_url.clone())
            .collect(),
        downloaded_resources: Vec::new(),
        can_revert_to_previous_version: result.previous_version_exists(),
    }
}
