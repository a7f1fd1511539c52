//! File-level delta between two manifest versions.

use std::collections::{HashMap, HashSet};

use super::types::{InvalidationStrategy, Manifest};

/// A file reference produced by a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub bytes: u64,
}

/// Files to fetch and files to evict when moving from one manifest to
/// another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub add: Vec<FileRef>,
    pub delete: Vec<FileRef>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty()
    }

    pub fn bytes_to_add(&self) -> u64 {
        self.add.iter().map(|f| f.bytes).sum()
    }

    pub fn bytes_to_delete(&self) -> u64 {
        self.delete.iter().map(|f| f.bytes).sum()
    }
}

/// Compute which files of `new` must be fetched and which files of `old`
/// must be evicted.
///
/// Each file of `new` resolves its invalidation against `default_invalidation`
/// when it declares `default`. A new file is added when `old` has no file of
/// the same name or when it resolves to `purge`. An old file is deleted when
/// `new` has no file of the same name or when that file resolves to `purge`.
pub fn diff_manifest_files(
    new: &Manifest,
    old: &Manifest,
    default_invalidation: InvalidationStrategy,
) -> ManifestDiff {
    let resolved: HashMap<&str, InvalidationStrategy> = new
        .files
        .iter()
        .map(|f| (f.name.as_str(), f.invalidation.resolve(default_invalidation)))
        .collect();
    let old_names: HashSet<&str> = old.files.iter().map(|f| f.name.as_str()).collect();

    let add = new
        .files
        .iter()
        .filter(|f| {
            !old_names.contains(f.name.as_str())
                || resolved.get(f.name.as_str()) == Some(&InvalidationStrategy::Purge)
        })
        .map(|f| FileRef {
            name: f.name.clone(),
            bytes: f.bytes,
        })
        .collect();

    let delete = old
        .files
        .iter()
        .filter(|f| match resolved.get(f.name.as_str()) {
            None => true,
            Some(strategy) => *strategy == InvalidationStrategy::Purge,
        })
        .map(|f| FileRef {
            name: f.name.clone(),
            bytes: f.bytes,
        })
        .collect();

    ManifestDiff { add, delete }
}
