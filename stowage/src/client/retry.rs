//! Retrying the failed part of earlier download jobs.

use tracing::{info, warn};
use uuid::Uuid;

use super::DownloadClient;
use crate::catalog::{CatalogIndexStorage, CatalogRecord, CatalogState};
use crate::download::{error_index_url, read_error_index, DownloadIndex, DownloadManager, QueueOptions};
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
    /// Queue the failed resources of every bundle in `canonical_urls` as one
    /// new job.
    ///
    /// Each bundle must be failed or aborted and own an error index with a
    /// single segment. The first bundle that does not qualify decides the
    /// returned status, and nothing is written. If the downloader will not
    /// take the job, the error indices are parked again and the bundles are
    /// left `update-aborted`.
    pub async fn retry_failed_downloads(&self, canonical_urls: &[String], title: &str) -> StowageResult<Status> {
        if canonical_urls.is_empty() {
            return Ok(Status::ZeroUpdatesProvided);
        }

        let downloads = self.download_indices().await?;
        let mut retries: Vec<(CatalogRecord, DownloadIndex)> = Vec::with_capacity(canonical_urls.len());
        for canonical_url in canonical_urls {
            let Some(record) = self.get_catalog_record(canonical_url).await? else {
                return Ok(Status::RemoteResourceNotFound);
            };
            if !record.state.is_retryable() {
                return Ok(Status::UpdateRetryImpossible);
            }
            let Some(error_index) = read_error_index(&self.cache, &record.resolved_url).await? else {
                return Ok(Status::ErrorIndexNotFound);
            };
            if downloads.find_by_canonical_url(canonical_url).is_some() {
                return Ok(Status::DownloadManagerUnsyncedState);
            }
            match error_index.segments.len() {
                0 => return Ok(Status::NoSegmentsFound),
                1 => {}
                _ => {
                    warn!(
                        canonical_url = %canonical_url,
                        segments = error_index.segments.len(),
                        "Error index holds more than one segment"
                    );
                    return Ok(Status::InvalidErrorDownloadIndex);
                }
            }
            retries.push((record, error_index));
        }

        let job_id = Uuid::new_v4().to_string();
        let mut index = DownloadIndex::new(job_id.clone(), title);
        for (_, error_index) in &retries {
            index.segments.extend(error_index.segments.iter().cloned().map(|mut segment| {
                segment.downloaded_resources.clear();
                segment
            }));
        }
        index.bytes = index.segments.iter().map(|s| s.bytes).sum();
        let urls = index.request_urls();
        let download_total = index.bytes;

        self.update_download_indices(|collection, now| collection.upsert(index, now))
            .await?;
        for (mut record, _) in retries.iter().cloned() {
            let resolved_url = record.resolved_url.clone();
            record.state = CatalogState::Updating;
            record.download_id = job_id.clone();
            self.put_catalog_record(record).await?;
            self.cache.delete(&error_index_url(&resolved_url)).await?;
        }

        let options = QueueOptions {
            title: title.to_string(),
            download_total,
        };
        let resources = urls.len();
        if !self.downloader.queue_download(&job_id, urls, options).await? {
            warn!(job_id = %job_id, "Downloader refused the retry job");
            self.abort_job(&job_id).await?;
            return Err(StowageError::Downloader(format!("job {} was not queued", job_id)));
        }
        info!(
            job_id = %job_id,
            bundles = retries.len(),
            resources = resources,
            bytes = download_total,
            "Failed downloads requeued"
        );
        Ok(Status::UpdateRetryQueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client, MockFetch, TestClient};
    use crate::download::{save_error_index, test_segment, ERROR_INDEX_ID};

    const A: &str = "https://cdn.example.com/a/stowage.json";
    const B: &str = "https://cdn.example.com/b/stowage.json";

    async fn failed(client: &TestClient, canonical_url: &str, segments: usize) {
        let mut record = crate::catalog::test_record(canonical_url, CatalogState::UpdateFailed);
        record.resolved_url = canonical_url.replace("stowage.json", "");
        record.download_id = String::new();
        let mut index = DownloadIndex::new(ERROR_INDEX_ID, "Failed");
        index.previous_id = "job-0".to_string();
        index.segments = (0..segments).map(|_| test_segment(canonical_url, 7)).collect();
        index.bytes = 7 * segments as u64;
        if segments == 1 {
            save_error_index(&client.cache, &record.resolved_url, &index).await.unwrap();
        } else {
            crate::storage::write_json(&client.cache, &error_index_url(&record.resolved_url), &index)
                .await
                .unwrap();
        }
        client.put_catalog_record(record).await.unwrap();
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_checks_in_order() {
        let (client, handles) = client(MockFetch::new());
        assert_eq!(
            client.retry_failed_downloads(&[], "t").await.unwrap(),
            Status::ZeroUpdatesProvided
        );
        assert_eq!(
            client.retry_failed_downloads(&urls(&[A]), "t").await.unwrap(),
            Status::RemoteResourceNotFound
        );

        client
            .put_catalog_record(crate::catalog::test_record(A, CatalogState::Cached))
            .await
            .unwrap();
        assert_eq!(
            client.retry_failed_downloads(&urls(&[A]), "t").await.unwrap(),
            Status::UpdateRetryImpossible
        );
        assert!(handles.downloader.queued().is_empty());
        assert!(client.download_indices().await.unwrap().downloads.is_empty());

        client
            .put_catalog_record(crate::catalog::test_record(B, CatalogState::UpdateAborted))
            .await
            .unwrap();
        assert_eq!(
            client.retry_failed_downloads(&urls(&[B]), "t").await.unwrap(),
            Status::ErrorIndexNotFound
        );
    }

    #[tokio::test]
    async fn test_segment_count_checks() {
        let (client, _) = client(MockFetch::new());
        failed(&client, A, 0).await;
        assert_eq!(
            client.retry_failed_downloads(&urls(&[A]), "t").await.unwrap(),
            Status::NoSegmentsFound
        );
        failed(&client, B, 2).await;
        assert_eq!(
            client.retry_failed_downloads(&urls(&[B]), "t").await.unwrap(),
            Status::InvalidErrorDownloadIndex
        );
    }

    #[tokio::test]
    async fn test_live_index_is_unsynced() {
        let (client, _) = client(MockFetch::new());
        failed(&client, A, 1).await;
        let mut live = DownloadIndex::new("job-9", "live");
        live.segments = vec![test_segment(A, 7)];
        client
            .update_download_indices(|c, now| c.upsert(live, now))
            .await
            .unwrap();
        assert_eq!(
            client.retry_failed_downloads(&urls(&[A]), "t").await.unwrap(),
            Status::DownloadManagerUnsyncedState
        );
    }

    #[tokio::test]
    async fn test_retry_merges_into_one_job() {
        let (client, handles) = client(MockFetch::new());
        failed(&client, A, 1).await;
        failed(&client, B, 1).await;

        assert_eq!(
            client.retry_failed_downloads(&urls(&[A, B]), "retry").await.unwrap(),
            Status::UpdateRetryQueued
        );

        let queued = handles.downloader.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(
            queued[0].urls,
            vec![
                "https://cdn.example.com/a/index.js".to_string(),
                "https://cdn.example.com/b/index.js".to_string()
            ]
        );
        assert_eq!(queued[0].options.download_total, 14);

        for url in [A, B] {
            let record = client.get_catalog_record(url).await.unwrap().unwrap();
            assert_eq!(record.state, CatalogState::Updating);
            assert_eq!(record.download_id, queued[0].id);
            assert!(read_error_index(&handles.cache, &record.resolved_url)
                .await
                .unwrap()
                .is_none());
        }
        let downloads = client.download_indices().await.unwrap();
        assert_eq!(downloads.find_by_id(&queued[0].id).unwrap().segments.len(), 2);
    }

    #[tokio::test]
    async fn test_refused_retry_keeps_error_index() {
        let (client, handles) = client(MockFetch::new());
        failed(&client, A, 1).await;
        handles.downloader.refuse_jobs();

        let refused = client.retry_failed_downloads(&urls(&[A]), "retry").await;
        assert!(matches!(refused, Err(StowageError::Downloader(_))));

        let record = client.get_catalog_record(A).await.unwrap().unwrap();
        assert_eq!(record.state, CatalogState::UpdateAborted);
        assert!(record.download_id.is_empty());
        assert!(client.download_indices().await.unwrap().downloads.is_empty());
        let parked = read_error_index(&handles.cache, &record.resolved_url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parked.segments.len(), 1);
        assert_eq!(parked.segments[0].canonical_url, A);
    }
}
