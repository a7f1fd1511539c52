//! Bundle lifecycle commands.
//!
//! Downloads run inside this process, so `install` and `retry` stay in the
//! foreground until every queued bundle settles and the downloader's
//! messages have been applied to the catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use stowage::catalog::CatalogRecord;
use stowage::client::{CheckRequest, UpdateCheckResult};
use stowage::config::readable_size;
use stowage::permissions::PermissionsSummary;
use stowage::poller::{Progress, ProgressPoller};
use stowage::Status;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::common::{describe_status, require_success, Client};
use super::output::Output;
use crate::error::CliError;

/// Default job title shown by the downloader.
const DEFAULT_TITLE: &str = "Bundle update";

/// Bundle subcommands.
#[derive(Debug, Subcommand)]
pub enum BundleCommands {
    /// Check bundles for updates without downloading anything
    Check {
        /// Manifest URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Install or update bundles
    Install {
        /// Manifest URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Title of the download job
        #[arg(long, default_value = DEFAULT_TITLE)]
        title: String,

        /// Fetch files directly instead of queueing a download job
        #[arg(long)]
        live: bool,
    },

    /// Retry bundles whose last download failed
    Retry {
        /// Manifest URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Title of the download job
        #[arg(long, default_value = DEFAULT_TITLE)]
        title: String,
    },

    /// Delete a bundle and its files
    Remove {
        /// Manifest URL
        url: String,
    },

    /// Delete a bundle's files but keep it listed as archived
    Archive {
        /// Manifest URL
        url: String,
    },

    /// List installed bundles
    List,

    /// Apply finished download results to the catalog
    Sync,

    /// Report a bundle's state until it settles
    Watch {
        /// Manifest URL
        url: String,
    },

    /// Show cache usage
    Disk,

    /// Store the origin's root page for offline use
    Offline,

    /// Delete every cached file and bundle record
    UninstallAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

/// Shared dependencies of bundle handlers.
pub struct CommandContext<'a> {
    pub output: &'a dyn Output,
    pub client: Arc<Client>,
    pub poll_interval: Duration,
}

/// Run a bundle subcommand.
pub async fn run(command: BundleCommands, ctx: &CommandContext<'_>) -> Result<(), CliError> {
    match command {
        BundleCommands::Check { urls } => check(ctx, &urls).await,
        BundleCommands::Install { urls, title, live } => install(ctx, &urls, &title, live).await,
        BundleCommands::Retry { urls, title } => retry(ctx, &urls, &title).await,
        BundleCommands::Remove { url } => remove(ctx, &url).await,
        BundleCommands::Archive { url } => archive(ctx, &url).await,
        BundleCommands::List => list(ctx).await,
        BundleCommands::Sync => sync(ctx).await,
        BundleCommands::Watch { url } => watch(ctx, &url).await,
        BundleCommands::Disk => disk(ctx).await,
        BundleCommands::Offline => offline(ctx).await,
        BundleCommands::UninstallAll { yes } => uninstall_all(ctx, yes).await,
    }
}

async fn check_urls(
    ctx: &CommandContext<'_>,
    urls: &[String],
) -> Result<Vec<UpdateCheckResult>, CliError> {
    let requests = urls
        .iter()
        .map(|url| CheckRequest::new(url.clone(), 0))
        .collect();
    let results = ctx.client.check_many(requests).await?;

    ctx.output.header("Update check");
    for result in &results {
        for line in format_check_result(result) {
            ctx.output.println(&line);
        }
        if let Some(manifest) = &result.new_manifest {
            if PermissionsSummary::from_permissions(&manifest.permissions).has_unsafe_permissions() {
                ctx.output.warning(&format!(
                    "{} requests unrestricted permissions",
                    manifest.name
                ));
            }
        }
    }
    ctx.output.newline();
    Ok(results)
}

async fn check(ctx: &CommandContext<'_>, urls: &[String]) -> Result<(), CliError> {
    let results = check_urls(ctx, urls).await?;
    match results.iter().find(|r| r.status.is_error()) {
        Some(failed) => Err(CliError::Operation {
            operation: "check".to_string(),
            status: failed.status,
        }),
        None => Ok(()),
    }
}

async fn install(
    ctx: &CommandContext<'_>,
    urls: &[String],
    title: &str,
    live: bool,
) -> Result<(), CliError> {
    let results = check_urls(ctx, urls).await?;
    let pending: Vec<String> = results
        .iter()
        .filter(|r| r.update_available())
        .map(|r| r.canonical_url.clone())
        .collect();

    if live {
        return install_live(ctx, &results).await;
    }

    let status = ctx.client.execute_updates(&results, title).await?;
    if status == Status::UpdateNotAvailable {
        ctx.output.success("All bundles are up to date");
        return Ok(());
    }
    let status = require_success("install", status)?;
    ctx.output.println(describe_status(status));

    if status == Status::UpdateQueued {
        wait_for_bundles(ctx, &pending).await?;
        ctx.output.success("Install complete");
    }
    Ok(())
}

async fn install_live(
    ctx: &CommandContext<'_>,
    results: &[UpdateCheckResult],
) -> Result<(), CliError> {
    let mut failed = None;
    let mut installed = 0;
    for result in results.iter().filter(|r| r.update_available()) {
        let status = ctx.client.live_update(result).await?;
        ctx.output.println(&format!(
            "{}: {}",
            result.canonical_url,
            describe_status(status)
        ));
        if status.is_error() {
            failed.get_or_insert(status);
        } else {
            installed += 1;
        }
    }

    if let Some(status) = failed {
        return Err(CliError::Operation {
            operation: "live install".to_string(),
            status,
        });
    }
    if installed == 0 {
        ctx.output.success("All bundles are up to date");
    } else {
        ctx.output.success(&format!("{} bundle(s) installed", installed));
    }
    Ok(())
}

async fn retry(ctx: &CommandContext<'_>, urls: &[String], title: &str) -> Result<(), CliError> {
    let status = ctx.client.retry_failed_downloads(urls, title).await?;
    let status = require_success("retry", status)?;
    ctx.output.println(describe_status(status));

    if status == Status::UpdateRetryQueued {
        wait_for_bundles(ctx, urls).await?;
        ctx.output.success("Retry complete");
    }
    Ok(())
}

async fn remove(ctx: &CommandContext<'_>, url: &str) -> Result<(), CliError> {
    require_success("remove", ctx.client.delete_bundle(url).await?)?;
    ctx.output.success(&format!("Removed {}", url));
    Ok(())
}

async fn archive(ctx: &CommandContext<'_>, url: &str) -> Result<(), CliError> {
    require_success("archive", ctx.client.archive_bundle(url).await?)?;
    ctx.output.success(&format!("Archived {}", url));
    Ok(())
}

async fn list(ctx: &CommandContext<'_>) -> Result<(), CliError> {
    let records = ctx.client.catalog_records().await?;
    if records.is_empty() {
        ctx.output.println("No bundles installed.");
        return Ok(());
    }

    ctx.output.header(&format!("Installed bundles ({})", records.len()));
    for record in &records {
        ctx.output.println(&format_record(record));
        ctx.output.indented(&record.canonical_url);
    }
    Ok(())
}

async fn sync(ctx: &CommandContext<'_>) -> Result<(), CliError> {
    let status = ctx.client.consume_queued_messages().await?;
    ctx.output.println(describe_status(status));
    Ok(())
}

async fn watch(ctx: &CommandContext<'_>, url: &str) -> Result<(), CliError> {
    if ctx.client.get_catalog_record(url).await?.is_none() {
        return Err(CliError::Operation {
            operation: "watch".to_string(),
            status: Status::NotFound,
        });
    }
    wait_for_bundles(ctx, &[url.to_string()]).await
}

async fn disk(ctx: &CommandContext<'_>) -> Result<(), CliError> {
    let info = ctx.client.disk_info().await?;
    ctx.output.header("Cache usage");
    ctx.output.println(&format!("Used:      {}", readable_size(info.used)));
    ctx.output.println(&format!("Available: {}", readable_size(info.total)));
    ctx.output.println(&format!("Free:      {}", readable_size(info.left)));
    Ok(())
}

async fn offline(ctx: &CommandContext<'_>) -> Result<(), CliError> {
    require_success("offline", ctx.client.cache_root_document_fallback().await?)?;
    ctx.output.success(&format!("Stored {}/ for offline use", ctx.client.origin()));
    Ok(())
}

async fn uninstall_all(ctx: &CommandContext<'_>, confirmed: bool) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::NotConfirmed(
            "This deletes every cached bundle. Re-run with --yes to confirm.".to_string(),
        ));
    }
    let status = ctx.client.uninstall_all_assets().await?;
    ctx.output.success(describe_status(status));
    Ok(())
}

/// Follow bundles until each one finishes or fails.
///
/// Reconciles downloader messages whenever a bundle reaches the installing
/// stage. Fails if any bundle ends in a failed state.
async fn wait_for_bundles(ctx: &CommandContext<'_>, urls: &[String]) -> Result<(), CliError> {
    if urls.is_empty() {
        return Ok(());
    }

    let poller = ProgressPoller::new(Arc::clone(&ctx.client), ctx.poll_interval);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut listeners = HashMap::new();
    for url in urls {
        let tx = tx.clone();
        let key = url.clone();
        let id = poller.listen(url, move |progress| {
            let _ = tx.send((key.clone(), progress.clone()));
        });
        listeners.insert(url.clone(), id);
    }
    drop(tx);

    let mut last: HashMap<String, Progress> = HashMap::new();
    let mut failures = Vec::new();

    while let Some((url, progress)) = rx.recv().await {
        if last.get(&url) != Some(&progress) {
            ctx.output.println(&format_progress(&url, &progress));
        }

        match &progress {
            Progress::Installing => {
                let status = ctx.client.consume_queued_messages().await?;
                info!(status = %status, "Downloader messages consumed");
            }
            Progress::Downloading(state) if state.state.failed => {
                // A failed job that could not be installed stays reported as
                // downloading; stop following it.
                warn!(url = %url, reason = %state.state.failure_reason, "Download job failed");
                if let Some(id) = listeners.get(&url) {
                    poller.unlisten(*id);
                }
                failures.push(format!("{}: {}", url, state.state.failure_reason));
            }
            Progress::Failed(state) => failures.push(format!("{}: {}", url, state)),
            _ => {}
        }
        last.insert(url, progress);
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(CliError::Download(failures.join("; ")))
    }
}

/// One-line summary of an installed bundle.
pub fn format_record(record: &CatalogRecord) -> String {
    format!(
        "{} v{} [{}] {}",
        record.name,
        record.version,
        record.state,
        readable_size(record.bytes)
    )
}

/// Progress line for a followed bundle.
pub fn format_progress(url: &str, progress: &Progress) -> String {
    match progress {
        Progress::Downloading(state) => format!(
            "{}: downloading v{} {:.0}% ({} of {})",
            url,
            state.version,
            state.state.fraction() * 100.0,
            readable_size(state.state.downloaded),
            readable_size(state.state.total)
        ),
        Progress::Failed(state) => format!("{}: failed ({})", url, state),
        Progress::Installing => format!("{}: installing", url),
        Progress::Finished => format!("{}: finished", url),
    }
}

/// Lines describing one update check.
pub fn format_check_result(result: &UpdateCheckResult) -> Vec<String> {
    let versions = result.versions();
    let mut lines = Vec::new();

    if result.status.is_error() {
        lines.push(format!(
            "{}: {}",
            result.canonical_url,
            describe_status(result.status)
        ));
        lines.extend(result.errors.iter().map(|e| format!("  {}", e)));
        return lines;
    }

    if !result.update_available() {
        lines.push(format!(
            "{}: up to date (v{})",
            result.canonical_url, versions.old
        ));
        return lines;
    }

    lines.push(format!(
        "{}: v{} -> v{}",
        result.canonical_url, versions.old, versions.new
    ));
    lines.push(format!(
        "  download {} in {} file(s), delete {}",
        readable_size(result.bytes_to_download()),
        result.downloadable_resources.len(),
        readable_size(result.bytes_to_delete())
    ));
    if !result.enough_storage() {
        lines.push(format!(
            "  needs {} more cache space",
            readable_size(result.bytes_needed())
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage::catalog::CatalogState;
    use stowage::client::BundleDownloadState;
    use stowage::disk::DiskInfo;
    use stowage::download::{DownloadState, DownloadableResource};
    use stowage::manifest::Manifest;

    fn result(url: &str) -> UpdateCheckResult {
        UpdateCheckResult::new(&CheckRequest::new(url, 0))
    }

    #[test]
    fn test_format_progress_downloading() {
        let mut state = DownloadState::new("job", 2048);
        state.downloaded = 1024;
        let progress = Progress::Downloading(BundleDownloadState {
            state,
            version: "1.2.0".to_string(),
            previous_version: "1.1.0".to_string(),
        });
        assert_eq!(
            format_progress("https://a.example.com/stowage.json", &progress),
            "https://a.example.com/stowage.json: downloading v1.2.0 50% (1.0 KB of 2.0 KB)"
        );
    }

    #[test]
    fn test_format_progress_terminal_states() {
        assert_eq!(format_progress("u", &Progress::Finished), "u: finished");
        assert_eq!(
            format_progress("u", &Progress::Failed(CatalogState::UpdateFailed)),
            "u: failed (update-failed)"
        );
    }

    #[test]
    fn test_format_check_result_up_to_date() {
        let lines = format_check_result(&result("https://a.example.com/stowage.json"));
        assert_eq!(lines, vec!["https://a.example.com/stowage.json: up to date (v0.0.0)"]);
    }

    #[test]
    fn test_format_check_result_update() {
        let mut check = result("https://a.example.com/stowage.json");
        check.new_manifest = Some(Manifest {
            version: "2.0.0".to_string(),
            ..Manifest::default()
        });
        check.downloadable_resources = vec![DownloadableResource {
            request_url: "https://cdn.example.com/app.js".to_string(),
            storage_url: "https://cdn.example.com/app.js".to_string(),
            bytes: 2048,
        }];
        check.disk_info = DiskInfo::new(0, 0, 1024 * 1024, 0);

        let lines = format_check_result(&check);
        assert_eq!(lines[0], "https://a.example.com/stowage.json: v0.0.0 -> v2.0.0");
        assert_eq!(lines[1], "  download 2.0 KB in 1 file(s), delete 0 B");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_format_check_result_reports_missing_space() {
        let mut check = result("https://a.example.com/stowage.json");
        check.new_manifest = Some(Manifest::default());
        check.downloadable_resources = vec![DownloadableResource {
            request_url: "https://cdn.example.com/big.bin".to_string(),
            storage_url: "https://cdn.example.com/big.bin".to_string(),
            bytes: 4096,
        }];
        check.disk_info = DiskInfo::new(0, 0, 1024, 0);

        let lines = format_check_result(&check);
        assert_eq!(lines.last().unwrap(), "  needs 3.0 KB more cache space");
    }

    #[test]
    fn test_format_check_result_error() {
        let mut check = result("ftp://nope");
        check.status = Status::MalformedUrl;
        check.errors.push("not an http(s) URL".to_string());
        let lines = format_check_result(&check);
        assert_eq!(lines[0], "ftp://nope: URL is not a valid http(s) URL");
        assert_eq!(lines[1], "  not an http(s) URL");
    }
}
