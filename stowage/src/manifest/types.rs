//! Manifest record types.

use serde::{Deserialize, Serialize};

use crate::permissions::Permission;
use crate::version::NULL_VERSION;

/// Placeholder for absent optional string fields.
pub const NULL_FIELD: &str = "none";

/// Manifest schema versions this client understands.
pub const SUPPORTED_CRATE_VERSIONS: &[&str] = &["0.1.0"];

/// Newest manifest schema version.
pub const LATEST_CRATE_VERSION: &str = "0.1.0";

/// Per-file (or manifest-wide) cache invalidation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidationStrategy {
    /// Defer to the caller-supplied default.
    #[default]
    Default,
    /// Re-download only when the file name is new.
    UrlDiff,
    /// Always replace.
    Purge,
}

impl InvalidationStrategy {
    /// Map arbitrary text onto a strategy; unknown values become `Default`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "purge" => Self::Purge,
            "url-diff" => Self::UrlDiff,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::UrlDiff => "url-diff",
            Self::Purge => "purge",
        }
    }

    /// Resolve `Default` against a fallback. A fallback of `Default` itself
    /// is treated as `UrlDiff`.
    pub fn resolve(self, fallback: Self) -> Self {
        match (self, fallback) {
            (Self::Default, Self::Default) => Self::UrlDiff,
            (Self::Default, fallback) => fallback,
            (explicit, _) => explicit,
        }
    }
}

/// A file declared by a manifest, relative to the manifest's base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub bytes: u64,
    #[serde(default)]
    pub invalidation: InvalidationStrategy,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, bytes: u64) -> Self {
        Self {
            name: name.into(),
            bytes,
            invalidation: InvalidationStrategy::Default,
        }
    }

    pub fn with_invalidation(mut self, invalidation: InvalidationStrategy) -> Self {
        self.invalidation = invalidation;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl Default for Repo {
    fn default() -> Self {
        Self {
            kind: NULL_FIELD.to_string(),
            url: NULL_FIELD.to_string(),
        }
    }
}

/// A validated bundle descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub crate_version: String,
    pub name: String,
    pub version: String,
    pub entry: String,
    pub files: Vec<FileEntry>,
    pub invalidation: InvalidationStrategy,
    pub description: String,
    pub authors: Vec<Author>,
    pub crate_logo_url: String,
    pub keywords: Vec<String>,
    pub license: String,
    pub repo: Repo,
    pub homepage_url: String,
    pub permissions: Vec<Permission>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            crate_version: LATEST_CRATE_VERSION.to_string(),
            name: NULL_FIELD.to_string(),
            version: NULL_VERSION.to_string(),
            entry: String::new(),
            files: Vec::new(),
            invalidation: InvalidationStrategy::Default,
            description: NULL_FIELD.to_string(),
            authors: Vec::new(),
            crate_logo_url: NULL_FIELD.to_string(),
            keywords: Vec::new(),
            license: NULL_FIELD.to_string(),
            repo: Repo::default(),
            homepage_url: NULL_FIELD.to_string(),
            permissions: Vec::new(),
        }
    }
}

impl Manifest {
    /// Sum of declared file sizes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn to_mini(&self) -> MiniManifest {
        MiniManifest {
            version: self.version.clone(),
        }
    }
}

/// Version-only mini manifest published next to a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniManifest {
    pub version: String,
}
