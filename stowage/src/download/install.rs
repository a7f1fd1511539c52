//! Job completion: move fetched resources into the cache and report the
//! outcome to the client.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::index::{
    download_indices_url, save_error_index, DownloadIndex, DownloadIndexCollection, Segment,
    ERROR_INDEX_ID,
};
use crate::catalog::CatalogState;
use crate::error::StowageResult;
use crate::messages::{ClientMessage, FileCacheMessageQueue, StateUpdate};
use crate::network::FetchResponse;
use crate::storage::{read_json, CachedFile, FileCache};
use crate::time::now_millis;

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every request was attempted.
    Finished,
    /// The job was cancelled before every request was attempted.
    Cancelled,
}

/// What happened to one requested URL.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub request_url: String,
    /// `Err` carries the failure reason when no response was obtained.
    pub response: Result<FetchResponse, String>,
}

/// Summary of a completed job.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Resources that mapped onto a segment.
    pub resources_processed: usize,
    pub failed: usize,
    /// Fetched URLs that no segment asked for.
    pub orphaned: Vec<String>,
    pub message: ClientMessage,
}

/// Reason phrase for an HTTP status.
pub(crate) fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("UNKNOWN STATUS")
        .to_string()
}

/// Finish job `job_id`.
///
/// Looks up the job's download index in the collection stored under
/// `origin`, stores every successful response at its storage URL, writes an
/// error index for each segment with failed resources and pushes one
/// [`ClientMessage`] with a state per segment:
///
/// - `cached` when every resource of the segment was stored
/// - `update-aborted` when some failed and the job was cancelled
/// - `update-failed` when some failed otherwise
///
/// Requested URLs missing from `fetched` count as failed. Returns `None`
/// when the job has no download index (it was cancelled and removed by the
/// client), in which case nothing is written.
pub async fn complete_job<C, Q>(
    cache: &C,
    messages: &FileCacheMessageQueue<Q>,
    origin: &str,
    job_id: &str,
    outcome: JobOutcome,
    fetched: Vec<FetchedResource>,
) -> StowageResult<Option<InstallReport>>
where
    C: FileCache,
    Q: FileCache,
{
    let collection: Option<DownloadIndexCollection> =
        read_json(cache, &download_indices_url(origin)).await?;
    let Some(index) = collection.and_then(|c| c.find_by_id(job_id).cloned()) else {
        info!(job_id = %job_id, "Job has no download index, ignoring completion");
        return Ok(None);
    };

    let mut by_url: HashMap<String, Result<FetchResponse, String>> = fetched
        .into_iter()
        .map(|f| (f.request_url, f.response))
        .collect();
    let mut mapped: HashSet<String> = HashSet::new();

    let mut report = InstallReport {
        resources_processed: 0,
        failed: 0,
        orphaned: Vec::new(),
        message: ClientMessage {
            id: job_id.to_string(),
            timestamp: now_millis(),
            download_id: job_id.to_string(),
            state_updates: Vec::with_capacity(index.segments.len()),
        },
    };

    for segment in &index.segments {
        debug!(job_id = %job_id, canonical_url = %segment.canonical_url, "Installing segment");
        let mut error_segment = Segment {
            map: Default::default(),
            bytes: 0,
            downloaded_resources: Vec::new(),
            ..segment.clone()
        };

        for (request_url, meta) in &segment.map {
            mapped.insert(request_url.clone());
            let response = by_url
                .remove(request_url)
                .unwrap_or_else(|| Err("not fetched".to_string()));

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
                    cache.put(&meta.storage_url, file).await?;
                    error_segment.downloaded_resources.push(request_url.clone());
                    report.resources_processed += 1;
                }
                Ok(response) => {
                    warn!(url = %request_url, status = response.status, "Resource fetch returned error status");
                    let mut failed = meta.clone();
                    failed.status = response.status;
                    failed.status_text = status_text(response.status);
                    error_segment.bytes += meta.bytes;
                    error_segment.map.insert(request_url.clone(), failed);
                    report.resources_processed += 1;
                    report.failed += 1;
                }
                Err(reason) => {
                    warn!(url = %request_url, reason = %reason, "Resource fetch failed");
                    let mut failed = meta.clone();
                    failed.status = 0;
                    failed.status_text = reason;
                    error_segment.bytes += meta.bytes;
                    error_segment.map.insert(request_url.clone(), failed);
                    report.failed += 1;
                }
            }
        }

        let state = match (error_segment.map.is_empty(), outcome) {
            (true, _) => CatalogState::Cached,
            (false, JobOutcome::Cancelled) => CatalogState::UpdateAborted,
            (false, JobOutcome::Finished) => CatalogState::UpdateFailed,
        };
        info!(
            job_id = %job_id,
            canonical_url = %segment.canonical_url,
            state = %state,
            failed = error_segment.map.len(),
            "Segment installed"
        );
        report.message.state_updates.push(StateUpdate {
            canonical_url: segment.canonical_url.clone(),
            state,
        });

        if error_segment.map.is_empty() {
            continue;
        }
        let error_index = DownloadIndex {
            id: ERROR_INDEX_ID.to_string(),
            previous_id: index.id.clone(),
            title: format!("Failed {}", segment.canonical_url),
            bytes: error_segment.bytes,
            started_at: now_millis(),
            segments: vec![error_segment],
        };
        save_error_index(cache, &segment.resolved_url, &error_index).await?;
    }

    report.orphaned = by_url
        .into_keys()
        .filter(|url| !mapped.contains(url))
        .collect();
    if !report.orphaned.is_empty() {
        warn!(job_id = %job_id, orphans = report.orphaned.len(), "Fetched resources matched no segment");
    }

    messages.push_message(&report.message).await?;
    Ok(Some(report))
}
