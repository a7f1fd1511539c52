//! Update check request and result types.

use crate::disk::DiskInfo;
use crate::download::DownloadableResource;
use crate::manifest::Manifest;
use crate::status::Status;
use crate::version::NULL_VERSION;

/// A bundle to check for updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// Manifest URL; its path must end with the configured manifest name.
    pub canonical_url: String,
    /// Caller-defined label stored with the catalog record.
    pub tag: u32,
}

impl CheckRequest {
    pub fn new(canonical_url: impl Into<String>, tag: u32) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            tag,
        }
    }
}

/// Installed and offered versions of a bundle, `"0.0.0"` when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versions {
    pub old: String,
    pub new: String,
}

/// Everything learnt while checking one bundle for updates.
#[derive(Debug, Clone)]
pub struct UpdateCheckResult {
    pub tag: u32,
    pub canonical_url: String,
    /// Base URL the new manifest was served from (trailing slash).
    pub resolved_url: String,
    /// Base URL of the installed version, empty when not installed.
    pub original_resolved_url: String,
    /// Offered manifest; `None` when no update is available or on error.
    pub new_manifest: Option<Manifest>,
    pub previous_manifest: Option<Manifest>,
    pub errors: Vec<String>,
    pub status: Status,
    pub downloadable_resources: Vec<DownloadableResource>,
    pub resources_to_delete: Vec<DownloadableResource>,
    pub disk_info: DiskInfo,
    /// Size of the manifest document itself.
    pub manifest_bytes: u64,
    /// The manifest document as served.
    pub raw_manifest: String,
}

impl UpdateCheckResult {
    pub fn new(request: &CheckRequest) -> Self {
        Self {
            tag: request.tag,
            canonical_url: request.canonical_url.clone(),
            resolved_url: String::new(),
            original_resolved_url: String::new(),
            new_manifest: None,
            previous_manifest: None,
            errors: Vec::new(),
            status: Status::Ok,
            downloadable_resources: Vec::new(),
            resources_to_delete: Vec::new(),
            disk_info: DiskInfo::default(),
            manifest_bytes: 0,
            raw_manifest: String::new(),
        }
    }

    pub(crate) fn fail(&mut self, status: Status, error: impl Into<String>) {
        self.status = status;
        self.errors.push(error.into());
    }

    pub fn error_occurred(&self) -> bool {
        self.status.is_error() || !self.errors.is_empty()
    }

    pub fn update_available(&self) -> bool {
        self.new_manifest.is_some()
    }

    pub fn previous_version_exists(&self) -> bool {
        self.previous_manifest.is_some()
    }

    pub fn bytes_to_download(&self) -> u64 {
        self.downloadable_resources.iter().map(|r| r.bytes).sum()
    }

    pub fn bytes_to_delete(&self) -> u64 {
        self.resources_to_delete.iter().map(|r| r.bytes).sum()
    }

    /// Total declared size of the offered manifest, 0 without one.
    pub fn manifest_total_bytes(&self) -> u64 {
        self.new_manifest
            .as_ref()
            .map(Manifest::total_bytes)
            .unwrap_or(0)
    }

    /// Whether the download fits the disk snapshot taken during the check.
    pub fn enough_storage(&self) -> bool {
        self.disk_info.enough_space(self.bytes_to_download())
    }

    pub fn bytes_needed(&self) -> u64 {
        self.disk_info.bytes_needed(self.bytes_to_download())
    }

    pub fn versions(&self) -> Versions {
        let version_of = |manifest: &Option<Manifest>| {
            manifest
                .as_ref()
                .map(|m| m.version.clone())
                .unwrap_or_else(|| NULL_VERSION.to_string())
        };
        Versions {
            old: version_of(&self.previous_manifest),
            new: version_of(&self.new_manifest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(bytes: u64) -> DownloadableResource {
        DownloadableResource {
            request_url: "https://a.com/x".to_string(),
            storage_url: "https://a.com/x".to_string(),
            bytes,
        }
    }

    #[test]
    fn test_error_occurred() {
        let mut result = UpdateCheckResult::new(&CheckRequest::new("https://a.com/stowage.json", 0));
        assert!(!result.error_occurred());
        result.errors.push("bad".to_string());
        assert!(result.error_occurred());

        let mut result = UpdateCheckResult::new(&CheckRequest::new("x", 0));
        result.status = Status::NetworkError;
        assert!(result.error_occurred());
    }

    #[test]
    fn test_storage_queries() {
        let mut result = UpdateCheckResult::new(&CheckRequest::new("https://a.com/stowage.json", 0));
        result.downloadable_resources = vec![resource(30), resource(20)];
        result.resources_to_delete = vec![resource(5)];
        result.disk_info = DiskInfo::new(60, 0, 100, 0);

        assert_eq!(result.bytes_to_download(), 50);
        assert_eq!(result.bytes_to_delete(), 5);
        assert!(!result.enough_storage());
        assert_eq!(result.bytes_needed(), 10);
    }

    #[test]
    fn test_versions_default_to_null() {
        let mut result = UpdateCheckResult::new(&CheckRequest::new("https://a.com/stowage.json", 0));
        assert_eq!(
            result.versions(),
            Versions {
                old: NULL_VERSION.to_string(),
                new: NULL_VERSION.to_string()
            }
        );
        result.new_manifest = Some(Manifest {
            version: "1.2.0".to_string(),
            ..Manifest::default()
        });
        assert_eq!(result.versions().new, "1.2.0");
        assert_eq!(result.manifest_total_bytes(), 0);
    }
}
