//! Validation of untrusted manifest JSON.
//!
//! Validation never fails outright. It walks the raw [`Value`], copies every
//! field whose presence and type check out into a default-valued
//! [`Manifest`], and records a human-readable error for every required field
//! that does not. Callers treat a non-empty error list as "invalid" but may
//! still inspect the best-effort result.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::types::{
    Author, FileEntry, InvalidationStrategy, Manifest, NULL_FIELD, SUPPORTED_CRATE_VERSIONS,
};
use crate::permissions::Permission;
use crate::urls::{is_cross_origin, strip_relative_path};
use crate::version::SemanticVersion;

/// Outcome of [`validate_manifest`].
#[derive(Debug, Clone, Default)]
pub struct ValidatedManifest {
    pub manifest: Manifest,
    pub errors: Vec<String>,
    /// Parsed `manifest.version`; the null version if it did not parse.
    pub version: SemanticVersion,
}

impl ValidatedManifest {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of [`validate_mini_manifest`].
#[derive(Debug, Clone, Default)]
pub struct ValidatedMiniManifest {
    pub version: SemanticVersion,
    pub errors: Vec<String>,
}

impl ValidatedMiniManifest {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn json_type(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

/// Read a required string field, recording an error if it is missing or
/// not a string.
fn required_str<'a>(obj: &'a Map<String, Value>, key: &str, errors: &mut Vec<String>) -> Option<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(s),
        other => {
            errors.push(format!(
                "{} should be a string, got \"{}\"",
                key,
                json_type(other)
            ));
            None
        }
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => NULL_FIELD.to_string(),
    }
}

/// Reject names that could escape the bundle's base directory.
fn has_parent_segment(name: &str) -> bool {
    name.split(['/', '\\']).any(|segment| segment == "..")
}

fn parse_version(text: &str, errors: &mut Vec<String>) -> Option<SemanticVersion> {
    let version = SemanticVersion::parse(text);
    if version.is_none() {
        errors.push(format!("{} is not a valid semantic version", text));
    }
    version
}

fn validate_files(raw: Option<&Value>, errors: &mut Vec<String>) -> Vec<FileEntry> {
    let Some(Value::Array(items)) = raw else {
        errors.push(format!(
            "files should be an array, got \"{}\"",
            json_type(raw)
        ));
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let (name, bytes, invalidation) = match item {
            Value::String(name) => (name.as_str(), 0, InvalidationStrategy::Default),
            Value::Object(file) => {
                let name = file.get("name").and_then(Value::as_str);
                let invalidation = match file.get("invalidation") {
                    None => Some(InvalidationStrategy::Default),
                    Some(Value::String(s)) => Some(InvalidationStrategy::from_str_lossy(s)),
                    Some(_) => None,
                };
                let (Some(name), Some(invalidation)) = (name, invalidation) else {
                    errors.push(format!(
                        "file {} is not a valid file format, file.name and file.invalidation must be a string",
                        i
                    ));
                    continue;
                };
                let bytes = file
                    .get("bytes")
                    .and_then(Value::as_f64)
                    .map(|b| b.max(0.0) as u64)
                    .unwrap_or(0);
                (name, bytes, invalidation)
            }
            other => {
                errors.push(format!(
                    "file {} is not an object. Expected an object with a \"name\" field, got {}",
                    i,
                    json_type(Some(other))
                ));
                continue;
            }
        };

        let name = strip_relative_path(name);
        if name.is_empty() || is_cross_origin(name) || has_parent_segment(name) {
            continue;
        }
        if !seen.insert(name.to_string()) {
            continue;
        }
        files.push(FileEntry {
            name: name.to_string(),
            bytes,
            invalidation,
        });
    }
    files
}

fn validate_authors(raw: Option<&Value>) -> Vec<Author> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|author| {
            let name = author.get("name")?.as_str()?;
            Some(Author {
                name: name.to_string(),
                email: optional_str(author, "email"),
                url: optional_str(author, "url"),
            })
        })
        .collect()
}

/// Accepts `"key"` shorthand or `{key, value[]}` objects; keys are unique,
/// first occurrence wins. Schema filtering is left to
/// [`clean_permissions`](crate::permissions::clean_permissions).
fn validate_permissions(raw: Option<&Value>) -> Vec<Permission> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut permissions = Vec::new();
    for item in items {
        let permission = match item {
            Value::String(key) => Permission::flag(key.as_str()),
            Value::Object(obj) => {
                let Some(key) = obj.get("key").and_then(Value::as_str) else {
                    continue;
                };
                let value = obj
                    .get("value")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Permission::new(key, value)
            }
            _ => continue,
        };
        if seen.insert(permission.key.clone()) {
            permissions.push(permission);
        }
    }
    permissions
}

/// Validate a raw manifest document.
pub fn validate_manifest(raw: &Value) -> ValidatedManifest {
    let mut out = ValidatedManifest::default();
    let Some(obj) = raw.as_object() else {
        out.errors.push(format!(
            "expected manifest to be type \"object\" got \"{}\"",
            json_type(Some(raw))
        ));
        return out;
    };
    let errors = &mut out.errors;
    let manifest = &mut out.manifest;

    match obj.get("crateVersion").and_then(Value::as_str) {
        Some(v) if SUPPORTED_CRATE_VERSIONS.contains(&v) => manifest.crate_version = v.to_string(),
        other => errors.push(format!(
            "crate version is invalid, got \"{}\", valid={}",
            other.unwrap_or("undefined"),
            SUPPORTED_CRATE_VERSIONS.join(",")
        )),
    }

    if let Some(name) = required_str(obj, "name", errors) {
        if !name.is_empty() {
            manifest.name = name.to_string();
        }
    }

    if let Some(version) = required_str(obj, "version", errors) {
        if let Some(parsed) = parse_version(version, errors) {
            out.version = parsed;
        }
        manifest.version = version.to_string();
    }

    manifest.files = validate_files(obj.get("files"), errors);

    if let Some(entry) = required_str(obj, "entry", errors) {
        manifest.entry = strip_relative_path(entry).to_string();
    }
    if !manifest.files.is_empty() && manifest.file(&manifest.entry).is_none() {
        errors.push(format!(
            "entry must be one of package listed files, got {}",
            manifest.entry
        ));
    }

    manifest.invalidation = obj
        .get("invalidation")
        .and_then(Value::as_str)
        .map(InvalidationStrategy::from_str_lossy)
        .unwrap_or_default();
    manifest.description = optional_str(obj, "description");
    manifest.authors = validate_authors(obj.get("authors"));
    manifest.crate_logo_url = strip_relative_path(&optional_str(obj, "crateLogoUrl")).to_string();
    manifest.keywords = obj
        .get("keywords")
        .and_then(Value::as_array)
        .map(|words| {
            words
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    manifest.license = optional_str(obj, "license");
    if let Some(repo) = obj.get("repo").and_then(Value::as_object) {
        manifest.repo.kind = optional_str(repo, "type");
        manifest.repo.url = optional_str(repo, "url");
    }
    manifest.homepage_url = optional_str(obj, "homepageUrl");
    manifest.permissions = validate_permissions(obj.get("permissions"));

    out
}

/// Validate a raw mini-manifest (`{"version": "..."}`).
pub fn validate_mini_manifest(raw: &Value) -> ValidatedMiniManifest {
    let mut out = ValidatedMiniManifest::default();
    let Some(obj) = raw.as_object() else {
        out.errors.push(format!(
            "expected mini manifest to be type \"object\" got \"{}\"",
            json_type(Some(raw))
        ));
        return out;
    };
    if let Some(version) = required_str(obj, "version", &mut out.errors) {
        if let Some(parsed) = parse_version(version, &mut out.errors) {
            out.version = parsed;
        }
    }
    out
}
