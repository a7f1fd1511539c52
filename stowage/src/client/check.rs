//! Update checks.

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{CheckRequest, DownloadClient, UpdateCheckResult};
use crate::catalog::CatalogIndexStorage;
use crate::download::{DownloadManager, DownloadableResource};
use crate::error::StowageResult;
use crate::manifest::{diff_manifest_files, validate_manifest, validate_mini_manifest, FileEntry};
use crate::messages::MessageConsumer;
use crate::network::{FetchRequest, NetworkFetch};
use crate::permissions::clean_permissions;
use crate::status::Status;
use crate::storage::FileCache;
use crate::urls::{base_url, file_name, parse_http_url};
use crate::version::SemanticVersion;

impl<N, C, D, S, M> DownloadClient<N, C, D, S, M>
where
    N: NetworkFetch,
    C: FileCache,
    D: DownloadManager,
    S: CatalogIndexStorage,
    M: MessageConsumer,
{
    /// Check one bundle for an update.
    ///
    /// Every expected failure is reported through the result's `status` and
    /// `errors`; the installed manifest is kept in `previous_manifest` in
    /// all cases.
    pub async fn check_for_updates(&self, request: CheckRequest) -> StowageResult<UpdateCheckResult> {
        let mut result = UpdateCheckResult::new(&request);
        self.run_check(&mut result).await?;
        result.disk_info = self.disk_info().await?;
        if result.error_occurred() {
            warn!(
                canonical_url = %result.canonical_url,
                status = %result.status,
                errors = ?result.errors,
                "Update check failed"
            );
        } else {
            info!(
                canonical_url = %result.canonical_url,
                update_available = result.update_available(),
                bytes = result.bytes_to_download(),
                "Update check finished"
            );
        }
        Ok(result)
    }

    /// Check several bundles concurrently.
    pub async fn check_many(&self, requests: Vec<CheckRequest>) -> StowageResult<Vec<UpdateCheckResult>> {
        join_all(requests.into_iter().map(|r| self.check_for_updates(r)))
            .await
            .into_iter()
            .collect()
    }

    async fn run_check(&self, result: &mut UpdateCheckResult) -> StowageResult<()> {
        let Some(url) = parse_http_url(&result.canonical_url) else {
            result.fail(Status::MalformedUrl, format!("{} is not a valid url", result.canonical_url));
            return Ok(());
        };
        if file_name(&url) != Some(self.config.manifest_name()) {
            result.fail(
                Status::InvalidManifestUrl,
                format!(
                    "{} must end with {}",
                    result.canonical_url,
                    self.config.manifest_name()
                ),
            );
            return Ok(());
        }
        let request_base = base_url(&url);

        let mut installed_version = SemanticVersion::null();
        if let Some(record) = self.get_catalog_record(&result.canonical_url).await? {
            if let Some(previous) = self
                .cached_manifest_at(&record.resolved_url, &record.manifest_name)
                .await?
            {
                installed_version = SemanticVersion::parse(&previous.version).unwrap_or_default();
                result.original_resolved_url = record.resolved_url.clone();
                result.previous_manifest = Some(previous);

                if let Some(offered) = self.fetch_mini_version(&request_base).await {
                    if !offered.is_greater(&installed_version) {
                        debug!(
                            canonical_url = %result.canonical_url,
                            installed = %installed_version,
                            offered = %offered,
                            "Mini manifest reports no newer version"
                        );
                        result.resolved_url = record.resolved_url;
                        return Ok(());
                    }
                }
            }
        }

        let response = match self
            .network
            .fetch(FetchRequest::get(result.canonical_url.clone()))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                result.fail(Status::NetworkError, e.to_string());
                return Ok(());
            }
        };
        if !response.is_success() {
            result.fail(
                Status::BadHttpCode,
                format!("{} returned status {}", result.canonical_url, response.status),
            );
            return Ok(());
        }
        let raw: serde_json::Value = match serde_json::from_slice(&response.body) {
            Ok(raw) => raw,
            Err(e) => {
                result.fail(Status::EncodingNotAcceptable, format!("manifest is not json: {}", e));
                return Ok(());
            }
        };
        let validated = validate_manifest(&raw);
        if !validated.is_valid() {
            result.status = Status::InvalidManifestEncoding;
            result.errors = validated.errors;
            return Ok(());
        }

        result.resolved_url = parse_http_url(&response.url)
            .map(|final_url| base_url(&final_url))
            .unwrap_or_else(|| request_base.clone());
        result.manifest_bytes = response.body.len() as u64;
        result.raw_manifest = String::from_utf8_lossy(&response.body).into_owned();

        if !validated.version.is_greater(&installed_version) {
            debug!(
                canonical_url = %result.canonical_url,
                installed = %installed_version,
                offered = %validated.version,
                "No newer version"
            );
            return Ok(());
        }

        let mut manifest = validated.manifest;
        if let Err(errors) = self.preflight(&result.resolved_url, &manifest.files).await {
            result.status = Status::PreflightVerificationFailed;
            result.errors = errors;
            return Ok(());
        }
        manifest.permissions = clean_permissions(&manifest.permissions);

        let baseline = result.previous_manifest.clone().unwrap_or_default();
        let diff = diff_manifest_files(&manifest, &baseline, self.config.default_invalidation());
        let delete_base = if result.original_resolved_url.is_empty() {
            result.resolved_url.clone()
        } else {
            result.original_resolved_url.clone()
        };
        result.downloadable_resources = diff
            .add
            .iter()
            .map(|file| {
                let url = format!("{}{}", result.resolved_url, file.name);
                DownloadableResource {
                    request_url: url.clone(),
                    storage_url: url,
                    bytes: file.bytes,
                }
            })
            .collect();
        result.resources_to_delete = diff
            .delete
            .iter()
            .map(|file| {
                let url = format!("{}{}", delete_base, file.name);
                DownloadableResource {
                    request_url: url.clone(),
                    storage_url: url,
                    bytes: file.bytes,
                }
            })
            .collect();
        result.new_manifest = Some(manifest);
        Ok(())
    }

    /// Version advertised by the mini manifest next to the bundle, if it
    /// can be fetched and parsed.
    async fn fetch_mini_version(&self, base: &str) -> Option<SemanticVersion> {
        let url = format!("{}{}", base, self.config.mini_manifest_name());
        let response = match self.network.fetch(FetchRequest::get(url.clone())).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!(url = %url, status = response.status, "Mini manifest unavailable");
                return None;
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Mini manifest request failed");
                return None;
            }
        };
        let raw: serde_json::Value = serde_json::from_slice(&response.body).ok()?;
        let validated = validate_mini_manifest(&raw);
        validated.is_valid().then_some(validated.version)
    }

    /// HEAD every declared file. Each failure yields one error line.
    async fn preflight(&self, base: &str, files: &[FileEntry]) -> Result<(), Vec<String>> {
        let preflights = files.iter().map(|file| {
            let url = format!("{}{}", base, file.name);
            async move {
                match self.network.fetch(FetchRequest::head(url.clone())).await {
                    Err(e) => Some(format!("{}: {}", url, e)),
                    Ok(response) if !response.is_success() => {
                        Some(format!("{}: status {}", url, response.status))
                    }
                    Ok(response) if response.content_length().is_none() => {
                        Some(format!("{}: missing content-length", url))
                    }
                    Ok(_) => None,
                }
            }
        });
        let errors: Vec<String> = join_all(preflights).await.into_iter().flatten().collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client, test_manifest, MockFetch};
    use crate::status::Status;

    const URL: &str = "https://cdn.example.com/pkg/stowage.json";

    #[tokio::test]
    async fn test_rejects_malformed_and_non_manifest_urls() {
        let (client, _) = client(MockFetch::new());
        let result = client.check_for_updates(CheckRequest::new("not a url", 0)).await.unwrap();
        assert_eq!(result.status, Status::MalformedUrl);
        assert!(result.error_occurred());

        let result = client
            .check_for_updates(CheckRequest::new("https://cdn.example.com/pkg/other.json", 0))
            .await
            .unwrap();
        assert_eq!(result.status, Status::InvalidManifestUrl);
    }

    #[tokio::test]
    async fn test_fresh_install_lists_every_file() {
        let fetch = MockFetch::new();
        fetch.serve_manifest(URL, &test_manifest("1.0.0", &[("index.js", 10), ("app.css", 5)]));
        let (client, _) = client(fetch);

        let result = client.check_for_updates(CheckRequest::new(URL, 3)).await.unwrap();
        assert_eq!(result.status, Status::Ok);
        assert!(!result.error_occurred());
        assert!(result.update_available());
        assert_eq!(result.tag, 3);
        assert_eq!(result.resolved_url, "https://cdn.example.com/pkg/");
        assert_eq!(result.bytes_to_download(), 15);
        assert!(result.resources_to_delete.is_empty());
        assert_eq!(
            result.downloadable_resources[0].request_url,
            "https://cdn.example.com/pkg/index.js"
        );
    }

    #[tokio::test]
    async fn test_redirect_changes_resolved_url() {
        let fetch = MockFetch::new();
        fetch.serve_manifest(URL, &test_manifest("1.0.0", &[("index.js", 10)]));
        fetch.redirect(URL, "https://mirror.example.com/v1/stowage.json");
        fetch.serve_file("https://mirror.example.com/v1/index.js", "x");
        let (client, _) = client(fetch);

        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.resolved_url, "https://mirror.example.com/v1/");
        assert_eq!(
            result.downloadable_resources[0].storage_url,
            "https://mirror.example.com/v1/index.js"
        );
    }

    #[tokio::test]
    async fn test_http_and_encoding_failures() {
        let fetch = MockFetch::new();
        fetch.serve_status(URL, 500);
        let (client, _) = client(fetch.clone());
        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        assert_eq!(result.status, Status::BadHttpCode);

        fetch.serve_raw(URL, "<html>nope</html>");
        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        assert_eq!(result.status, Status::EncodingNotAcceptable);

        fetch.serve_raw(URL, r#"{"crateVersion":"9.9.9"}"#);
        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        assert_eq!(result.status, Status::InvalidManifestEncoding);
        assert!(!result.errors.is_empty());

        let result = client
            .check_for_updates(CheckRequest::new("https://offline.example.com/stowage.json", 0))
            .await
            .unwrap();
        assert_eq!(result.status, Status::NetworkError);
    }

    #[tokio::test]
    async fn test_preflight_failure_hides_manifest() {
        let fetch = MockFetch::new();
        fetch.serve_manifest(URL, &test_manifest("1.0.0", &[("index.js", 10)]));
        fetch.serve_status("https://cdn.example.com/pkg/index.js", 404);
        let (client, _) = client(fetch);

        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        assert_eq!(result.status, Status::PreflightVerificationFailed);
        assert!(!result.update_available());
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_permissions_are_cleaned() {
        let fetch = MockFetch::new();
        let mut manifest = test_manifest("1.0.0", &[("index.js", 10)]);
        manifest.permissions = vec![
            crate::permissions::Permission::flag("camera"),
            crate::permissions::Permission::flag("geolocation"),
        ];
        fetch.serve_manifest(URL, &manifest);
        let (client, _) = client(fetch);

        let result = client.check_for_updates(CheckRequest::new(URL, 0)).await.unwrap();
        let permissions = &result.new_manifest.unwrap().permissions;
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].key, "geolocation");
    }
}
