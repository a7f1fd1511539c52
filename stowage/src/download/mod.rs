//! Download jobs: index records, the download manager port, the in-process
//! manager and the job completion routine.

mod index;
mod install;
mod local;
mod manager;

pub use index::{
    create_resource_map, download_indices_url, error_index_url, read_error_index,
    save_error_index, DownloadIndex, DownloadIndexCollection, DownloadableResource,
    ResourceMap, ResourceMeta, Segment, SegmentRemoval, ERROR_INDEX_ID,
};
pub use install::{complete_job, FetchedResource, InstallReport, JobOutcome};
pub(crate) use install::status_text;
pub use local::LocalDownloader;
pub use manager::{DownloadManager, DownloadState, QueueOptions};

#[cfg(test)]
pub(crate) use index::tests::segment as test_segment;
