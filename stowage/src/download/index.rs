//! Download index records.
//!
//! A [`DownloadIndex`] describes one queued job: one [`Segment`] per bundle,
//! each with a [`ResourceMap`] from request URL to storage metadata. Live
//! indices are kept together in a [`DownloadIndexCollection`]; a failed
//! segment is parked in a per-bundle error index until it is retried.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StowageResult;
use crate::storage::{read_json, write_json, FileCache};
use crate::urls::{add_slash_to_end, mime_for_url, remove_slash_at_end};

/// Id carried by every error index.
pub const ERROR_INDEX_ID: &str = "err";

/// URL of the live download collection for `origin`.
pub fn download_indices_url(origin: &str) -> String {
    format!("{}/__download-indices__.json", remove_slash_at_end(origin))
}

/// URL of the error index for the bundle at `resolved_url`.
pub fn error_index_url(resolved_url: &str) -> String {
    format!("{}__err-download-index__.json", add_slash_to_end(resolved_url))
}

/// A file to fetch (or evict) for a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadableResource {
    pub request_url: String,
    pub storage_url: String,
    pub bytes: u64,
}

/// Where a fetched resource goes and what it looked like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub storage_url: String,
    pub bytes: u64,
    pub mime: String,
    /// HTTP status of the last attempt, 0 before any attempt.
    pub status: u16,
    pub status_text: String,
}

/// Request URL → resource metadata.
pub type ResourceMap = BTreeMap<String, ResourceMeta>;

/// Build the resource map for a list of downloadable resources.
pub fn create_resource_map(resources: &[DownloadableResource]) -> ResourceMap {
    resources
        .iter()
        .map(|resource| {
            (
                resource.request_url.clone(),
                ResourceMeta {
                    storage_url: resource.storage_url.clone(),
                    bytes: resource.bytes,
                    mime: mime_for_url(&resource.request_url).to_string(),
                    status: 0,
                    status_text: String::new(),
                },
            )
        })
        .collect()
}

/// The part of a job that belongs to one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub name: String,
    pub map: ResourceMap,
    pub bytes: u64,
    pub version: String,
    pub previous_version: String,
    pub resolved_url: String,
    pub canonical_url: String,
    pub resources_to_delete: Vec<String>,
    pub downloaded_resources: Vec<String>,
    pub can_revert_to_previous_version: bool,
}

/// One queued download job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadIndex {
    pub id: String,
    /// Job this one continues (set on error indices), empty otherwise.
    pub previous_id: String,
    pub title: String,
    pub bytes: u64,
    pub started_at: u64,
    pub segments: Vec<Segment>,
}

impl DownloadIndex {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            previous_id: String::new(),
            title: title.into(),
            bytes: 0,
            started_at: 0,
            segments: Vec::new(),
        }
    }

    pub fn segment(&self, canonical_url: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.canonical_url == canonical_url)
    }

    /// Every request URL across all segments.
    pub fn request_urls(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|s| s.map.keys().cloned())
            .collect()
    }
}

/// Persisted collection of live download indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadIndexCollection {
    pub downloads: Vec<DownloadIndex>,
    pub total_bytes: u64,
    pub updated_at: u64,
    pub created_at: u64,
    pub saved_at: u64,
}

impl DownloadIndexCollection {
    pub fn new(now: u64) -> Self {
        Self {
            downloads: Vec::new(),
            total_bytes: 0,
            updated_at: now,
            created_at: now,
            saved_at: now,
        }
    }

    /// The live index holding a segment for `canonical_url`.
    pub fn find_by_canonical_url(&self, canonical_url: &str) -> Option<&DownloadIndex> {
        self.downloads
            .iter()
            .find(|index| index.segment(canonical_url).is_some())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&DownloadIndex> {
        self.downloads.iter().find(|index| index.id == id)
    }

    /// Insert or replace the index with the same id. A new index gets
    /// `started_at = now`.
    pub fn upsert(&mut self, mut index: DownloadIndex, now: u64) {
        self.updated_at = now;
        match self.downloads.iter_mut().find(|d| d.id == index.id) {
            Some(existing) => {
                index.started_at = existing.started_at;
                *existing = index;
            }
            None => {
                index.started_at = now;
                self.downloads.push(index);
            }
        }
        self.recount();
    }

    /// Remove the index with `id`. Returns whether one was present.
    pub fn remove_by_id(&mut self, id: &str, now: u64) -> bool {
        let before = self.downloads.len();
        self.downloads.retain(|d| d.id != id);
        let removed = before != self.downloads.len();
        if removed {
            self.updated_at = now;
            self.recount();
        }
        removed
    }

    /// Remove the segment for `canonical_url` from whichever index holds it.
    ///
    /// An index left without segments is removed too; its id is returned so
    /// the caller can cancel the job.
    pub fn remove_segment(&mut self, canonical_url: &str, now: u64) -> SegmentRemoval {
        let Some(position) = self
            .downloads
            .iter()
            .position(|index| index.segment(canonical_url).is_some())
        else {
            return SegmentRemoval::NotFound;
        };

        let index = &mut self.downloads[position];
        if let Some(segment) = index.segment(canonical_url) {
            index.bytes = index.bytes.saturating_sub(segment.bytes);
        }
        index.segments.retain(|s| s.canonical_url != canonical_url);
        self.updated_at = now;

        let outcome = if index.segments.is_empty() {
            let id = index.id.clone();
            self.downloads.remove(position);
            SegmentRemoval::RemovedIndex(id)
        } else {
            SegmentRemoval::RemovedSegment
        };
        self.recount();
        outcome
    }

    fn recount(&mut self) {
        self.total_bytes = self.downloads.iter().map(|d| d.bytes).sum();
    }
}

/// Result of [`DownloadIndexCollection::remove_segment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentRemoval {
    NotFound,
    /// Other segments remain in the index.
    RemovedSegment,
    /// The segment was the last one; the index with this id is gone.
    RemovedIndex(String),
}

/// Load the error index for a bundle.
pub async fn read_error_index<C: FileCache>(
    cache: &C,
    resolved_url: &str,
) -> StowageResult<Option<DownloadIndex>> {
    read_json(cache, &error_index_url(resolved_url)).await
}

/// Store the error index for a bundle. Indices without exactly one segment
/// are not written; returns whether the index was saved.
pub async fn save_error_index<C: FileCache>(
    cache: &C,
    resolved_url: &str,
    index: &DownloadIndex,
) -> StowageResult<bool> {
    if index.segments.len() != 1 {
        return Ok(false);
    }
    write_json(cache, &error_index_url(resolved_url), index).await?;
    Ok(true)
}
