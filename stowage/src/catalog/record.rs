//! Catalog record types and collection operations.

use serde::{Deserialize, Serialize};

use crate::permissions::Permission;

/// `download_id` value meaning no job is queued for the bundle.
pub const NO_DOWNLOAD_QUEUED: &str = "";

/// Lifecycle state of an installed bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogState {
    Cached,
    Updating,
    UpdateFailed,
    UpdateAborted,
    Archived,
}

impl CatalogState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Updating => "updating",
            Self::UpdateFailed => "update-failed",
            Self::UpdateAborted => "update-aborted",
            Self::Archived => "archived",
        }
    }

    /// States a failed-download retry may start from.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpdateFailed | Self::UpdateAborted)
    }
}

impl std::fmt::Display for CatalogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the client remembers about one installed bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub tag: u32,
    pub name: String,
    pub logo: String,
    /// Base URL files were fetched from, with trailing slash.
    pub resolved_url: String,
    /// Manifest URL the bundle was requested by.
    pub canonical_url: String,
    pub manifest_name: String,
    /// Total declared size of the bundle.
    pub bytes: u64,
    /// Absolute entry URL, or `"none"`.
    pub entry: String,
    pub version: String,
    pub permissions: Vec<Permission>,
    pub state: CatalogState,
    /// Job id, [`NO_DOWNLOAD_QUEUED`] when idle.
    pub download_id: String,
    pub created: u64,
    pub updated: u64,
}

impl CatalogRecord {
    pub fn has_queued_download(&self) -> bool {
        self.download_id != NO_DOWNLOAD_QUEUED
    }
}

/// Persisted collection of catalog records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogIndices {
    pub records: Vec<CatalogRecord>,
    pub updated_at: u64,
    pub created_at: u64,
    pub saved_at: u64,
}

impl CatalogIndices {
    pub fn new(now: u64) -> Self {
        Self {
            records: Vec::new(),
            updated_at: now,
            created_at: now,
            saved_at: now,
        }
    }

    pub fn find(&self, canonical_url: &str) -> Option<&CatalogRecord> {
        self.records.iter().find(|r| r.canonical_url == canonical_url)
    }

    /// Insert or replace the record for `record.canonical_url`.
    ///
    /// A replaced record keeps its `created` timestamp; `updated` is set to
    /// `now` either way. Returns the record as stored.
    pub fn upsert(&mut self, mut record: CatalogRecord, now: u64) -> CatalogRecord {
        record.updated = now;
        self.updated_at = now;
        match self
            .records
            .iter_mut()
            .find(|r| r.canonical_url == record.canonical_url)
        {
            Some(existing) => {
                record.created = existing.created;
                *existing = record.clone();
            }
            None => {
                record.created = now;
                self.records.push(record.clone());
            }
        }
        record
    }

    /// Remove a record. Returns whether one was present.
    pub fn remove(&mut self, canonical_url: &str, now: u64) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.canonical_url != canonical_url);
        let removed = self.records.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }
}
