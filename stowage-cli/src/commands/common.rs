//! Client construction and helpers shared across commands.

use std::sync::Arc;

use stowage::catalog::FileCacheCatalogStorage;
use stowage::client::{Adaptors, DownloadClient};
use stowage::config::ConfigFile;
use stowage::download::LocalDownloader;
use stowage::messages::FileCacheMessageQueue;
use stowage::network::ReqwestFetch;
use stowage::storage::DiskFileCache;
use stowage::Status;
use tracing::info;

use crate::error::CliError;

pub type Network = Arc<ReqwestFetch>;
pub type Cache = Arc<DiskFileCache>;

/// The client as wired by the CLI: reqwest, a disk cache and the in-process
/// downloader.
pub type Client = DownloadClient<
    Network,
    Cache,
    LocalDownloader<Network, Cache>,
    FileCacheCatalogStorage<Cache>,
    FileCacheMessageQueue<Cache>,
>;

/// Build a client from the user configuration.
pub async fn build_client(config: &ConfigFile) -> Result<Client, CliError> {
    let download_config = config.download_config();
    let network = Arc::new(
        ReqwestFetch::with_config(&download_config).map_err(|e| CliError::Config(e.to_string()))?,
    );
    let cache = Arc::new(DiskFileCache::open(&config.storage.directory, config.storage.quota).await?);
    let client_config = config.client_config();
    let origin = client_config.origin().to_string();

    info!(
        origin = %origin,
        cache = %config.storage.directory.display(),
        quota = config.storage.quota,
        "Building client"
    );

    let adaptors = Adaptors {
        network: Arc::clone(&network),
        cache: Arc::clone(&cache),
        downloader: LocalDownloader::new(network, Arc::clone(&cache), &origin, &download_config),
        catalog: FileCacheCatalogStorage::new(Arc::clone(&cache), &origin),
        messages: FileCacheMessageQueue::new(cache, &origin),
    };
    Ok(DownloadClient::new(client_config, adaptors)?)
}

/// Turn an error status into a [`CliError`], passing other statuses through.
pub fn require_success(operation: &str, status: Status) -> Result<Status, CliError> {
    if status.is_error() {
        Err(CliError::Operation {
            operation: operation.to_string(),
            status,
        })
    } else {
        Ok(status)
    }
}

/// Human-readable explanation of a status.
pub fn describe_status(status: Status) -> &'static str {
    match status {
        Status::Ok => "done",
        Status::Cached => "stored in the cache",
        Status::Deleted => "removed from the cache",
        Status::Archived => "archived, files removed",
        Status::UpdateQueued => "download queued",
        Status::UpdateRetryQueued => "retry queued",
        Status::NoDownloadbleResources => "installed, nothing to download",
        Status::MessagesConsumed => "downloader messages applied",
        Status::NoMessagesFound => "no downloader messages",
        Status::SomeMessagesAreOrphaned => "some downloader messages had no bundle",
        Status::AllMessagesAreOrphaned => "no downloader message had a bundle",
        Status::ZeroUpdatesProvided => "nothing to do",
        Status::UpdateAlreadyQueued => "an update is already in progress",
        Status::NotFound => "bundle is not installed",
        Status::MalformedUrl => "URL is not a valid http(s) URL",
        Status::InvalidManifestUrl => "URL does not point at a manifest",
        Status::NetworkError => "network request failed",
        Status::BadHttpCode => "server returned an error code",
        Status::EncodingNotAcceptable => "server did not return JSON",
        Status::InvalidManifestEncoding => "manifest failed validation",
        Status::PreflightVerificationFailed => "some files could not be verified on the server",
        Status::UpdateImpossible => "check failed, cannot update",
        Status::UpdateNotAvailable => "already up to date",
        Status::InsufficentDiskSpace => "not enough space in the cache",
        Status::DownloadManagerUnsyncedState => "downloader still reports a job for this bundle",
        Status::UpdateRetryImpossible => "bundle is not in a failed state",
        Status::RemoteResourceNotFound => "bundle is not installed",
        Status::ErrorIndexNotFound => "no record of the failed download",
        Status::NoSegmentsFound => "failed download has nothing to retry",
        Status::InvalidErrorDownloadIndex => "failed download record is unreadable",
        Status::LiveFetchFailed => "some files failed to download",
    }
}
