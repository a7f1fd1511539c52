//! Applying completion messages to the catalog and repairing bundles whose
//! job has vanished.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, warn};

use super::DownloadClient;
use crate::catalog::{CatalogIndexStorage, CatalogState, NO_DOWNLOAD_QUEUED};
use crate::download::{save_error_index, DownloadIndex, DownloadManager, ERROR_INDEX_ID};
use crate::error::StowageResult;
use crate::messages::{ClientMessage, MessageConsumer};
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
    /// Apply every queued completion message, then delete it along with the
    /// download index of its job.
    ///
    /// State updates for bundles missing from the catalog are orphans and
    /// are dropped. Afterwards, bundles still pointing at a job that is gone
    /// are marked `update-aborted` (see [`repair_stale_downloads`]). The
    /// returned status describes the messages only.
    ///
    /// [`repair_stale_downloads`]: Self::repair_stale_downloads
    pub async fn consume_queued_messages(&self) -> StowageResult<Status> {
        let messages = self.messages.get_all_messages().await?;
        let status = if messages.is_empty() {
            Status::NoMessagesFound
        } else {
            self.apply_messages(&messages).await?
        };

        let repaired = self.repair_stale_downloads().await?;
        if repaired > 0 {
            info!(repaired = repaired, "Stale downloads repaired");
        }
        Ok(status)
    }

    async fn apply_messages(&self, messages: &[ClientMessage]) -> StowageResult<Status> {
        let mut total = 0usize;
        let mut orphans = 0usize;
        for message in messages {
            for update in &message.state_updates {
                total += 1;
                let Some(mut record) = self.get_catalog_record(&update.canonical_url).await? else {
                    warn!(
                        canonical_url = %update.canonical_url,
                        job_id = %message.download_id,
                        "State update for unknown bundle"
                    );
                    orphans += 1;
                    continue;
                };
                debug!(
                    canonical_url = %update.canonical_url,
                    from = %record.state,
                    to = %update.state,
                    "Applying state update"
                );
                record.state = update.state;
                record.download_id = NO_DOWNLOAD_QUEUED.to_string();
                self.put_catalog_record(record).await?;
            }

            let job_id = message.download_id.as_str();
            self.update_download_indices(|collection, now| collection.remove_by_id(job_id, now))
                .await?;
            self.messages.delete_message(&message.id).await?;
        }

        let status = match orphans {
            0 => Status::MessagesConsumed,
            n if n == total => Status::AllMessagesAreOrphaned,
            _ => Status::SomeMessagesAreOrphaned,
        };
        info!(
            messages = messages.len(),
            updates = total,
            orphans = orphans,
            status = %status,
            "Queued messages consumed"
        );
        Ok(status)
    }

    /// Settle bundles whose recorded job no longer exists.
    ///
    /// A bundle is stale when no live index of its job holds its segment, or
    /// when the downloader no longer reports the job and no completion
    /// message for it is queued. Jobs with segments are abandoned through
    /// [`abort_job`](Self::abort_job); a stale bundle without a segment is
    /// marked `update-aborted` on its own. Returns the bundles repaired.
    async fn repair_stale_downloads(&self) -> StowageResult<usize> {
        let downloads = self.download_indices().await?;
        let mut candidates = Vec::new();
        for record in self.catalog_records().await? {
            if !record.has_queued_download() {
                continue;
            }
            let has_segment = downloads
                .find_by_id(&record.download_id)
                .and_then(|index| index.segment(&record.canonical_url))
                .is_some();
            if has_segment
                && self
                    .downloader
                    .get_download_state(&record.download_id)
                    .await?
                    .is_some()
            {
                continue;
            }
            candidates.push((record, has_segment));
        }
        if candidates.is_empty() {
            return Ok(0);
        }

        // Read after the downloader: a job leaves the downloader only once
        // its message is queued.
        let pending: HashSet<String> = self
            .messages
            .get_all_messages()
            .await?
            .into_iter()
            .map(|message| message.download_id)
            .collect();

        let mut stale_jobs = BTreeSet::new();
        let mut repaired = 0;
        for (mut record, has_segment) in candidates {
            if pending.contains(&record.download_id) {
                continue;
            }
            warn!(
                canonical_url = %record.canonical_url,
                job_id = %record.download_id,
                has_segment = has_segment,
                "Bundle points at a job that is gone"
            );
            if has_segment {
                stale_jobs.insert(record.download_id.clone());
            } else {
                record.state = CatalogState::UpdateAborted;
                record.download_id = NO_DOWNLOAD_QUEUED.to_string();
                self.put_catalog_record(record).await?;
                repaired += 1;
            }
        }
        for job_id in &stale_jobs {
            repaired += self.abort_job(job_id).await?;
        }
        Ok(repaired)
    }

    /// Abandon job `job_id`.
    ///
    /// Every bundle still pointing at the job gets its segment parked as its
    /// error index and is marked `update-aborted`, so it can be retried. The
    /// live index is dropped. Returns the number of bundles marked.
    pub(super) async fn abort_job(&self, job_id: &str) -> StowageResult<usize> {
        let Some(index) = self.download_indices().await?.find_by_id(job_id).cloned() else {
            return Ok(0);
        };

        let mut aborted = 0;
        for segment in &index.segments {
            let Some(mut record) = self.get_catalog_record(&segment.canonical_url).await? else {
                continue;
            };
            if record.download_id != job_id {
                continue;
            }

            let mut error_index = DownloadIndex::new(ERROR_INDEX_ID, index.title.clone());
            error_index.previous_id = job_id.to_string();
            error_index.bytes = segment.bytes;
            error_index.segments = vec![segment.clone()];
            save_error_index(&self.cache, &record.resolved_url, &error_index).await?;

            record.state = CatalogState::UpdateAborted;
            record.download_id = NO_DOWNLOAD_QUEUED.to_string();
            self.put_catalog_record(record).await?;
            aborted += 1;
        }

        self.update_download_indices(|collection, now| collection.remove_by_id(job_id, now))
            .await?;
        info!(
            job_id = %job_id,
            segments = index.segments.len(),
            aborted = aborted,
            "Download job abandoned"
        );
        Ok(aborted)
    }
}
