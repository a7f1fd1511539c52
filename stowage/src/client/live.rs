//! Installing an update in the foreground, without the download manager.

use futures::future::join_all;
use tracing::{info, warn};

use super::execute::segment_for;
use super::{DownloadClient, UpdateCheckResult};
use crate::catalog::{CatalogIndexStorage, CatalogState, NO_DOWNLOAD_QUEUED};
use crate::download::{
    save_error_index, status_text, DownloadIndex, DownloadManager, ResourceMap, ERROR_INDEX_ID,
};
use crate::error::StowageResult;
use crate::messages::MessageConsumer;
use crate::network::{FetchRequest, NetworkFetch};
use crate::status::Status;
use crate::storage::{CachedFile, FileCache};
use crate::time::now_millis;

impl<N, C, D, S, M> DownloadClient<N, C, D, S, M>
where
    N: NetworkFetch,
    C: FileCache,
    D: DownloadManager,
    S: CatalogIndexStorage,
    M: MessageConsumer,
{
    /// Fetch and store every resource of `result` right away.
    ///
    /// On partial failure the bundle is left `update-failed` with an error
    /// index, so [`retry_failed_downloads`](Self::retry_failed_downloads)
    /// can pick it up.
    pub async fn live_update(&self, result: &UpdateCheckResult) -> StowageResult<Status> {
        if result.error_occurred() {
            return Ok(Status::UpdateImpossible);
        }
        let Some(manifest) = result.new_manifest.as_ref() else {
            return Ok(Status::UpdateNotAvailable);
        };
        if !self.disk_info().await?.enough_space(result.bytes_to_download()) {
            return Ok(Status::InsufficentDiskSpace);
        }
        if self
            .download_indices()
            .await?
            .find_by_canonical_url(&result.canonical_url)
            .is_some()
        {
            return Ok(Status::UpdateAlreadyQueued);
        }

        for resource in &result.resources_to_delete {
            self.cache.delete(&resource.storage_url).await?;
        }

        let responses = join_all(result.downloadable_resources.iter().map(|resource| {
            self.network
                .fetch(FetchRequest::get(resource.request_url.clone()))
        }))
        .await;

        let mut segment = segment_for(result);
        let mut failed = ResourceMap::new();
        for (resource, response) in result.downloadable_resources.iter().zip(responses) {
            let Some(meta) = segment.map.get(&resource.request_url) else {
                continue;
            };
            match response {
                Ok(response) if response.is_success() => {
                    let content_type = response
                        .content_type()
                        .unwrap_or(meta.mime.as_str())
                        .to_string();
                    let file = CachedFile {
                        body: response.body,
                        content_type,
                        status: response.status,
                    };
                    self.cache.put(&resource.storage_url, file).await?;
                }
                Ok(response) => {
                    let mut meta = meta.clone();
                    meta.status = response.status;
                    meta.status_text = status_text(response.status);
                    failed.insert(resource.request_url.clone(), meta);
                }
                Err(e) => {
                    let mut meta = meta.clone();
                    meta.status_text = e.to_string();
                    failed.insert(resource.request_url.clone(), meta);
                }
            }
        }

        self.write_manifest(result, manifest).await?;

        if failed.is_empty() {
            self.put_catalog_record(self.record_from_result(
                result,
                manifest,
                CatalogState::Cached,
                NO_DOWNLOAD_QUEUED,
            ))
            .await?;
            info!(
                canonical_url = %result.canonical_url,
                resources = result.downloadable_resources.len(),
                "Live update installed"
            );
            return Ok(Status::Ok);
        }

        warn!(
            canonical_url = %result.canonical_url,
            failed = failed.len(),
            "Live update incomplete"
        );
        segment.bytes = failed.values().map(|m| m.bytes).sum();
        segment.map = failed;
        let error_index = DownloadIndex {
            id: ERROR_INDEX_ID.to_string(),
            previous_id: String::new(),
            title: format!("Failed {}", result.canonical_url),
            bytes: segment.bytes,
            started_at: now_millis(),
            segments: vec![segment],
        };
        save_error_index(&self.cache, &result.resolved_url, &error_index).await?;
        self.put_catalog_record(self.record_from_result(
            result,
            manifest,
            CatalogState::UpdateFailed,
            NO_DOWNLOAD_QUEUED,
        ))
        .await?;
        Ok(Status::LiveFetchFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client, test_manifest, MockFetch};
    use crate::client::CheckRequest;
    use crate::download::read_error_index;

    const URL: &str = "https://cdn.example.com/pkg/stowage.json";

    #[tokio::test]
    async fn test_live_update_installs_files() {
        let fetch = MockFetch::new();
        fetch.serve_manifest(URL, &test_manifest("1.0.0", &[("index.js", 4), ("app.css", 2)]));
        let (client, handles) = client(fetch);

        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        assert_eq!(client.live_update(&result).await.unwrap(), Status::Ok);

        let record = client.get_catalog_record(URL).await.unwrap().unwrap();
        assert_eq!(record.state, CatalogState::Cached);
        assert_eq!(record.version, "1.0.0");
        let file = handles
            .cache
            .get("https://cdn.example.com/pkg/index.js")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.len(), 4);
        assert!(handles.downloader.queued().is_empty());

        let again = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        assert!(!again.update_available());
        assert_eq!(client.live_update(&again).await.unwrap(), Status::UpdateNotAvailable);
    }

    #[tokio::test]
    async fn test_live_update_failure_leaves_error_index() {
        let fetch = MockFetch::new();
        fetch.serve_manifest(URL, &test_manifest("1.0.0", &[("index.js", 4), ("app.css", 2)]));
        let (client, handles) = client(fetch.clone());
        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();

        fetch.serve_status("https://cdn.example.com/pkg/app.css", 503);
        assert_eq!(client.live_update(&result).await.unwrap(), Status::LiveFetchFailed);

        let record = client.get_catalog_record(URL).await.unwrap().unwrap();
        assert_eq!(record.state, CatalogState::UpdateFailed);
        let index = read_error_index(&handles.cache, "https://cdn.example.com/pkg/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.segments.len(), 1);
        let failed = &index.segments[0].map;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed["https://cdn.example.com/pkg/app.css"].status, 503);
        assert_eq!(index.bytes, 2);
    }

    #[tokio::test]
    async fn test_live_update_refuses_failed_check() {
        let (client, _) = client(MockFetch::new());
        let mut result = UpdateCheckResult::new(&CheckRequest::new(URL, 0));
        result.fail(Status::BadHttpCode, "500");
        assert_eq!(client.live_update(&result).await.unwrap(), Status::UpdateImpossible);
    }
}
