//! Removing and archiving bundles.

use tracing::{debug, info};

use super::DownloadClient;
use crate::catalog::{CatalogIndexStorage, CatalogRecord, CatalogState, NO_DOWNLOAD_QUEUED};
use crate::download::{error_index_url, DownloadManager, SegmentRemoval};
use crate::error::StowageResult;
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
    /// Remove a bundle: its files, its manifest, its pending download and
    /// its catalog record.
    ///
    /// Removing the last segment of a job cancels the job.
    pub async fn delete_bundle(&self, canonical_url: &str) -> StowageResult<Status> {
        let Some(record) = self.get_catalog_record(canonical_url).await? else {
            return Ok(Status::NotFound);
        };
        self.detach_bundle(&record).await?;
        self.delete_catalog_record(canonical_url).await?;
        info!(canonical_url = %canonical_url, "Bundle deleted");
        Ok(Status::Ok)
    }

    /// Like [`delete_bundle`](Self::delete_bundle) but keeps the catalog
    /// record, marked `archived`.
    pub async fn archive_bundle(&self, canonical_url: &str) -> StowageResult<Status> {
        let Some(mut record) = self.get_catalog_record(canonical_url).await? else {
            return Ok(Status::NotFound);
        };
        self.detach_bundle(&record).await?;
        record.state = CatalogState::Archived;
        record.download_id = NO_DOWNLOAD_QUEUED.to_string();
        self.put_catalog_record(record).await?;
        info!(canonical_url = %canonical_url, "Bundle archived");
        Ok(Status::Archived)
    }

    /// Drop a bundle's pending download, error index and stored files.
    async fn detach_bundle(&self, record: &CatalogRecord) -> StowageResult<()> {
        let canonical_url = record.canonical_url.as_str();
        let removal = self
            .update_download_indices(|collection, now| collection.remove_segment(canonical_url, now))
            .await?;
        match removal {
            SegmentRemoval::NotFound => {}
            SegmentRemoval::RemovedSegment => {
                debug!(canonical_url = %canonical_url, "Segment removed from shared job");
            }
            SegmentRemoval::RemovedIndex(job_id) => {
                let cancelled = self.downloader.cancel_download(&job_id).await?;
                debug!(job_id = %job_id, cancelled = cancelled, "Job emptied and cancelled");
            }
        }

        self.cache.delete(&error_index_url(&record.resolved_url)).await?;
        self.delete_bundle_files(record, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client, MockFetch};
    use crate::download::{test_segment, DownloadIndex};
    use crate::manifest::{FileEntry, Manifest};
    use crate::storage::{write_json, CachedFile};

    const A: &str = "https://cdn.example.com/a/stowage.json";
    const B: &str = "https://cdn.example.com/b/stowage.json";

    async fn install(
        client: &crate::client::tests::TestClient,
        canonical_url: &str,
        job_id: &str,
    ) -> CatalogRecord {
        let mut record = crate::catalog::test_record(canonical_url, CatalogState::Updating);
        record.resolved_url = canonical_url.replace("stowage.json", "");
        record.download_id = job_id.to_string();
        let manifest = Manifest {
            files: vec![FileEntry::new("index.js", 1)],
            ..Manifest::default()
        };
        write_json(&client.cache, canonical_url, &manifest).await.unwrap();
        client
            .cache
            .put(
                &format!("{}index.js", record.resolved_url),
                CachedFile::new("x", "text/javascript"),
            )
            .await
            .unwrap();
        client.put_catalog_record(record).await.unwrap()
    }

    async fn queue(client: &crate::client::tests::TestClient, job_id: &str, urls: &[&str]) {
        let mut index = DownloadIndex::new(job_id, "job");
        index.segments = urls.iter().map(|u| test_segment(u, 10)).collect();
        index.bytes = 10 * urls.len() as u64;
        client
            .update_download_indices(|c, now| c.upsert(index, now))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_bundle_not_found() {
        let (client, _) = client(MockFetch::new());
        assert_eq!(client.delete_bundle(A).await.unwrap(), Status::NotFound);
        assert_eq!(client.archive_bundle(A).await.unwrap(), Status::NotFound);
    }

    #[tokio::test]
    async fn test_deleting_sole_segment_cancels_job() {
        let (client, handles) = client(MockFetch::new());
        install(&client, A, "job-1").await;
        queue(&client, "job-1", &[A]).await;

        assert_eq!(client.delete_bundle(A).await.unwrap(), Status::Ok);
        assert_eq!(handles.downloader.cancelled(), vec!["job-1".to_string()]);
        assert!(client.download_indices().await.unwrap().downloads.is_empty());
        assert!(client.get_catalog_record(A).await.unwrap().is_none());
        assert!(handles
            .cache
            .get("https://cdn.example.com/a/index.js")
            .await
            .unwrap()
            .is_none());
        assert!(handles.cache.get(A).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleting_shared_segment_keeps_job() {
        let (client, handles) = client(MockFetch::new());
        install(&client, A, "job-1").await;
        install(&client, B, "job-1").await;
        queue(&client, "job-1", &[A, B]).await;

        assert_eq!(client.delete_bundle(A).await.unwrap(), Status::Ok);
        assert!(handles.downloader.cancelled().is_empty());
        let downloads = client.download_indices().await.unwrap();
        assert_eq!(downloads.downloads.len(), 1);
        assert_eq!(downloads.downloads[0].segments.len(), 1);
        assert_eq!(downloads.total_bytes, 10);
        assert!(client.get_catalog_record(B).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_archive_keeps_record() {
        let (client, handles) = client(MockFetch::new());
        install(&client, A, "job-1").await;
        queue(&client, "job-1", &[A]).await;

        assert_eq!(client.archive_bundle(A).await.unwrap(), Status::Archived);
        let record = client.get_catalog_record(A).await.unwrap().unwrap();
        assert_eq!(record.state, CatalogState::Archived);
        assert_eq!(record.download_id, NO_DOWNLOAD_QUEUED);
        assert!(handles
            .cache
            .get("https://cdn.example.com/a/index.js")
            .await
            .unwrap()
            .is_none());
    }
}
