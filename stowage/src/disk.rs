//! Disk budget arithmetic.

use serde::Serialize;

use crate::config::readable_size;

/// Storage available to bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskInfo {
    /// Bytes stored plus bytes promised to queued downloads.
    pub used: u64,
    /// Quota minus the reserved margin.
    pub total: u64,
    pub left: u64,
}

impl DiskInfo {
    /// Compute the budget from cache usage, the bytes of live download
    /// indices, the cache quota and the reserved margin.
    pub fn new(cache_usage: u64, pending_download_bytes: u64, quota: u64, reserved: u64) -> Self {
        let used = cache_usage.saturating_add(pending_download_bytes);
        let total = quota.saturating_sub(reserved);
        Self {
            used,
            total,
            left: total.saturating_sub(used),
        }
    }

    /// Whether `bytes` more would still fit strictly below the total.
    pub fn enough_space(&self, bytes: u64) -> bool {
        self.total > 0 && self.used.saturating_add(bytes) < self.total
    }

    /// Bytes missing for `bytes` more to fit, 0 when they already fit.
    pub fn bytes_needed(&self, bytes: u64) -> u64 {
        self.used.saturating_add(bytes).saturating_sub(self.total)
    }
}

impl std::fmt::Display for DiskInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} used of {} ({} left)",
            readable_size(self.used),
            readable_size(self.total),
            readable_size(self.left)
        )
    }
}
