//! Download manager port.
//!
//! The client hands byte transfer to a [`DownloadManager`]: it queues a job
//! under an id it allocated, polls its progress, and may cancel it. How the
//! bytes move is up to the implementation; when a job ends, the manager is
//! expected to run [`complete_job`](super::complete_job) (or an equivalent)
//! so the client can reconcile the outcome.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StowageResult;

/// Progress of one job as reported by a download manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadState {
    pub id: String,
    /// Bytes received so far.
    pub downloaded: u64,
    /// Expected total bytes.
    pub total: u64,
    pub failed: bool,
    pub finished: bool,
    pub failure_reason: String,
}

impl DownloadState {
    pub fn new(id: impl Into<String>, total: u64) -> Self {
        Self {
            id: id.into(),
            total,
            ..Default::default()
        }
    }

    /// Completed fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return if self.finished { 1.0 } else { 0.0 };
        }
        (self.downloaded as f64 / self.total as f64).min(1.0)
    }
}

/// Options passed along with a queued job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub title: String,
    pub download_total: u64,
}

/// Transfers the resources of queued jobs.
pub trait DownloadManager: Send + Sync {
    /// Start fetching `urls` under job `id`. Returns `false` if the job
    /// could not be queued (for example, the id is already in use).
    fn queue_download(
        &self,
        id: &str,
        urls: Vec<String>,
        options: QueueOptions,
    ) -> impl Future<Output = StowageResult<bool>> + Send;

    /// State of a job the manager still knows about.
    fn get_download_state(
        &self,
        id: &str,
    ) -> impl Future<Output = StowageResult<Option<DownloadState>>> + Send;

    /// Cancel a job. Returns `false` for unknown ids.
    fn cancel_download(&self, id: &str) -> impl Future<Output = StowageResult<bool>> + Send;

    /// Ids of every job the manager still knows about.
    fn current_download_ids(&self) -> impl Future<Output = StowageResult<Vec<String>>> + Send;
}

impl<T: DownloadManager> DownloadManager for Arc<T> {
    fn queue_download(
        &self,
        id: &str,
        urls: Vec<String>,
        options: QueueOptions,
    ) -> impl Future<Output = StowageResult<bool>> + Send {
        (**self).queue_download(id, urls, options)
    }

    fn get_download_state(
        &self,
        id: &str,
    ) -> impl Future<Output = StowageResult<Option<DownloadState>>> + Send {
        (**self).get_download_state(id)
    }

    fn cancel_download(&self, id: &str) -> impl Future<Output = StowageResult<bool>> + Send {
        (**self).cancel_download(id)
    }

    fn current_download_ids(&self) -> impl Future<Output = StowageResult<Vec<String>>> + Send {
        (**self).current_download_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        let mut state = DownloadState::new("job", 200);
        state.downloaded = 50;
        assert!((state.fraction() - 0.25).abs() < f64::EPSILON);

        let mut empty = DownloadState::new("job", 0);
        assert_eq!(empty.fraction(), 0.0);
        empty.finished = true;
        assert_eq!(empty.fraction(), 1.0);
    }

    #[test]
    fn test_state_json_field_names() {
        let json = serde_json::to_value(DownloadState::new("job", 1)).unwrap();
        assert_eq!(json["failureReason"], "");
        assert_eq!(json["finished"], false);
    }
}
