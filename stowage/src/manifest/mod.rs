//! Bundle manifest model.
//!
//! A manifest describes a versioned set of files served from one base URL,
//! plus the permissions the bundle asks for. This module provides:
//!
//! - [`validate_manifest`] / [`validate_mini_manifest`]: turn untrusted JSON
//!   into a [`Manifest`] plus a list of errors, never panicking
//! - [`diff_manifest_files`]: the add/delete file sets between two versions,
//!   driven by per-file [`InvalidationStrategy`]

mod diff;
mod types;
mod validate;

pub use diff::{diff_manifest_files, FileRef, ManifestDiff};
pub use types::{
    Author, FileEntry, InvalidationStrategy, Manifest, MiniManifest, Repo, LATEST_CRATE_VERSION,
    NULL_FIELD, SUPPORTED_CRATE_VERSIONS,
};
pub use validate::{
    validate_manifest, validate_mini_manifest, ValidatedManifest, ValidatedMiniManifest,
};
