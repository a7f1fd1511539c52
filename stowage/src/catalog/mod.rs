//! Catalog of installed bundles.
//!
//! One [`CatalogRecord`] per canonical manifest URL, kept together in a
//! [`CatalogIndices`] collection persisted at
//! `{origin}/__catalog-indices__.json`.

mod record;
mod storage;

pub use record::{CatalogIndices, CatalogRecord, CatalogState, NO_DOWNLOAD_QUEUED};
pub use storage::{catalog_indices_url, CatalogIndexStorage, FileCacheCatalogStorage};

#[cfg(test)]
pub(crate) use record::tests::record as test_record;
