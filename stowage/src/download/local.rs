//! In-process download manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::install::{complete_job, FetchedResource, JobOutcome};
use super::manager::{DownloadManager, DownloadState, QueueOptions};
use crate::config::DownloadConfig;
use crate::error::StowageResult;
use crate::messages::FileCacheMessageQueue;
use crate::network::{FetchRequest, NetworkFetch};
use crate::storage::FileCache;

struct Job {
    total: u64,
    downloaded: Arc<AtomicU64>,
    token: CancellationToken,
    /// Set when installing the job failed; the job is then kept so the
    /// failure stays visible.
    failure: Option<String>,
}

struct Inner<N, C> {
    network: N,
    cache: C,
    messages: FileCacheMessageQueue<C>,
    origin: String,
    concurrency: usize,
    jobs: RwLock<HashMap<String, Job>>,
}

/// [`DownloadManager`] running each job as a tokio task.
///
/// A job fetches its URLs with bounded concurrency, then runs
/// [`complete_job`] against the same cache the client uses. The job stays
/// visible through [`DownloadManager::get_download_state`] until installing
/// finishes.
pub struct LocalDownloader<N, C> {
    inner: Arc<Inner<N, C>>,
}

impl<N, C> Clone for LocalDownloader<N, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N, C> LocalDownloader<N, C>
where
    N: NetworkFetch + 'static,
    C: FileCache + Clone + 'static,
{
    pub fn new(network: N, cache: C, origin: &str, config: &DownloadConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                network,
                messages: FileCacheMessageQueue::new(cache.clone(), origin),
                cache,
                origin: origin.to_string(),
                concurrency: config.concurrency(),
                jobs: RwLock::new(HashMap::new()),
            }),
        }
    }
}

impl<N, C> Inner<N, C>
where
    N: NetworkFetch + 'static,
    C: FileCache + Clone + 'static,
{
    async fn run_job(
        self: Arc<Self>,
        id: String,
        urls: Vec<String>,
        token: CancellationToken,
        downloaded: Arc<AtomicU64>,
    ) {
        info!(job_id = %id, resources = urls.len(), "Download job started");
        let this = Arc::clone(&self);
        let mut results = stream::iter(urls)
            .map(move |url| {
                let this = Arc::clone(&this);
                async move {
                    let response = this
                        .network
                        .fetch(FetchRequest::get(url.clone()))
                        .await
                        .map_err(|e| e.to_string());
                    FetchedResource {
                        request_url: url,
                        response,
                    }
                }
            })
            .buffer_unordered(self.concurrency);

        let mut fetched = Vec::new();
        let outcome = loop {
            tokio::select! {
                _ = token.cancelled() => break JobOutcome::Cancelled,
                next = results.next() => match next {
                    Some(resource) => {
                        if let Ok(response) = &resource.response {
                            if response.is_success() {
                                downloaded.fetch_add(response.body.len() as u64, Ordering::Relaxed);
                            }
                        }
                        debug!(job_id = %id, url = %resource.request_url, "Resource fetched");
                        fetched.push(resource);
                    }
                    None => break JobOutcome::Finished,
                }
            }
        };
        drop(results);
        info!(job_id = %id, outcome = ?outcome, fetched = fetched.len(), "Download job ended");

        let result = complete_job(
            &self.cache,
            &self.messages,
            &self.origin,
            &id,
            outcome,
            fetched,
        )
        .await;

        let mut jobs = self.jobs.write().await;
        match result {
            Ok(_) => {
                jobs.remove(&id);
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Failed to install download job");
                if let Some(job) = jobs.get_mut(&id) {
                    job.failure = Some(e.to_string());
                }
            }
        }
    }
}

impl<N, C> DownloadManager for LocalDownloader<N, C>
where
    N: NetworkFetch + 'static,
    C: FileCache + Clone + 'static,
{
    async fn queue_download(
        &self,
        id: &str,
        urls: Vec<String>,
        options: QueueOptions,
    ) -> StowageResult<bool> {
        let token = CancellationToken::new();
        let downloaded = Arc::new(AtomicU64::new(0));
        {
            let mut jobs = self.inner.jobs.write().await;
            if jobs.contains_key(id) {
                return Ok(false);
            }
            jobs.insert(
                id.to_string(),
                Job {
                    total: options.download_total,
                    downloaded: Arc::clone(&downloaded),
                    token: token.clone(),
                    failure: None,
                },
            );
        }
        debug!(job_id = %id, title = %options.title, total = options.download_total, "Job queued");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.run_job(id.to_string(), urls, token, downloaded));
        Ok(true)
    }

    async fn get_download_state(&self, id: &str) -> StowageResult<Option<DownloadState>> {
        let jobs = self.inner.jobs.read().await;
        Ok(jobs.get(id).map(|job| DownloadState {
            id: id.to_string(),
            downloaded: job.downloaded.load(Ordering::Relaxed),
            total: job.total,
            failed: job.failure.is_some(),
            finished: job.failure.is_some(),
            failure_reason: job.failure.clone().unwrap_or_default(),
        }))
    }

    async fn cancel_download(&self, id: &str) -> StowageResult<bool> {
        let jobs = self.inner.jobs.read().await;
        match jobs.get(id) {
            Some(job) => {
                info!(job_id = %id, "Cancelling download job");
                job.token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn current_download_ids(&self) -> StowageResult<Vec<String>> {
        let mut ids: Vec<String> = self.inner.jobs.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogState;
    use crate::download::index::tests::segment;
    use crate::download::index::{download_indices_url, DownloadIndex, DownloadIndexCollection};
    use crate::messages::MessageConsumer;
    use crate::network::{FetchError, FetchResponse};
    use crate::storage::{write_json, MemoryFileCache};
    use std::time::Duration;

    const ORIGIN: &str = "https://games.local";

    /// Serves every URL with a fixed body after an optional delay.
    struct SlowFetch {
        delay: Duration,
    }

    impl NetworkFetch for SlowFetch {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
            tokio::time::sleep(self.delay).await;
            Ok(FetchResponse::new(200, request.url.clone()).with_body("data"))
        }
    }

    async fn downloader(delay: Duration) -> (Arc<MemoryFileCache>, LocalDownloader<SlowFetch, Arc<MemoryFileCache>>) {
        let cache = Arc::new(MemoryFileCache::new());
        let mut index = DownloadIndex::new("job", "update");
        index.segments = vec![segment("https://a.com/stowage.json", 4)];
        let mut collection = DownloadIndexCollection::new(0);
        collection.upsert(index, 1);
        write_json(&cache, &download_indices_url(ORIGIN), &collection)
            .await
            .unwrap();
        let downloader = LocalDownloader::new(
            SlowFetch { delay },
            Arc::clone(&cache),
            ORIGIN,
            &DownloadConfig::default(),
        );
        (cache, downloader)
    }

    async fn wait_until_gone(downloader: &LocalDownloader<SlowFetch, Arc<MemoryFileCache>>) {
        for _ in 0..200 {
            if downloader.get_download_state("job").await.unwrap().is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never finished");
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let (cache, downloader) = downloader(Duration::ZERO).await;
        let queued = downloader
            .queue_download(
                "job",
                vec!["https://a.com/index.js".to_string()],
                QueueOptions {
                    title: "update".to_string(),
                    download_total: 4,
                },
            )
            .await
            .unwrap();
        assert!(queued);
        wait_until_gone(&downloader).await;

        assert_eq!(
            cache.get("https://a.com/index.js").await.unwrap().unwrap().text(),
            "data"
        );
        let queue = FileCacheMessageQueue::new(Arc::clone(&cache), ORIGIN);
        let messages = queue.get_all_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].state_updates[0].state, CatalogState::Cached);
        assert!(downloader.current_download_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_and_cancel() {
        let (cache, downloader) = downloader(Duration::from_secs(30)).await;
        let urls = vec!["https://a.com/index.js".to_string()];
        assert!(downloader
            .queue_download("job", urls.clone(), QueueOptions::default())
            .await
            .unwrap());
        assert!(!downloader
            .queue_download("job", urls, QueueOptions::default())
            .await
            .unwrap());

        let state = downloader.get_download_state("job").await.unwrap().unwrap();
        assert!(!state.finished);
        assert_eq!(downloader.current_download_ids().await.unwrap(), vec!["job"]);

        assert!(downloader.cancel_download("job").await.unwrap());
        wait_until_gone(&downloader).await;
        assert!(!downloader.cancel_download("job").await.unwrap());

        let queue = FileCacheMessageQueue::new(Arc::clone(&cache), ORIGIN);
        let messages = queue.get_all_messages().await.unwrap();
        assert_eq!(messages[0].state_updates[0].state, CatalogState::UpdateAborted);
    }
}
