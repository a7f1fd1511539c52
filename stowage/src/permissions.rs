//! Permission list sanitizing and summaries.
//!
//! Manifests declare permissions as `{key, value[]}` pairs taken straight
//! from untrusted JSON. [`clean_permissions`] reduces such a list to the
//! known schema; [`PermissionsSummary`] folds a cleaned list into the flat
//! shape consumed by the sandbox host.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Sentinel value (and key) granting everything.
pub const ALLOW_ALL: &str = "*";

/// A single declared permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub key: String,
    #[serde(default)]
    pub value: Vec<String>,
}

impl Permission {
    pub fn new(key: impl Into<String>, value: Vec<String>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn flag(key: impl Into<String>) -> Self {
        Self::new(key, Vec::new())
    }
}

/// How a known permission key treats its value list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermissionKind {
    /// Carries no values.
    Flag,
    /// Open-ended value list, validated per key.
    Extendable,
    /// Values restricted to a fixed set of options.
    Fixed(&'static [&'static str]),
}

fn permission_kind(key: &str) -> Option<PermissionKind> {
    match key {
        ALLOW_ALL | "geolocation" | "unlimitedStorage" => Some(PermissionKind::Flag),
        "webRequest" | "embedExtensions" => Some(PermissionKind::Extendable),
        "files" => Some(PermissionKind::Fixed(&["read"])),
        "gameSaves" => Some(PermissionKind::Fixed(&["read", "write"])),
        _ => None,
    }
}

/// True when a network origin would weaken the sandbox policy: not http(s),
/// contains a wildcard, or has no dot in it.
pub fn is_dangerous_origin(value: &str) -> bool {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return true;
    }
    value.contains('*') || !value.contains('.')
}

fn is_valid_web_request_value(value: &str) -> bool {
    !is_dangerous_origin(value) && crate::urls::parse_http_url(value).is_some()
}

fn is_valid_value(key: &str, kind: PermissionKind, value: &str) -> bool {
    match kind {
        PermissionKind::Flag => false,
        PermissionKind::Fixed(options) => options.contains(&value),
        PermissionKind::Extendable if key == "webRequest" => is_valid_web_request_value(value),
        PermissionKind::Extendable => !value.trim().is_empty(),
    }
}

/// Filter an untrusted permission list against the known schema.
///
/// - unknown keys are dropped, and only the first occurrence of a key is kept
/// - flag keys are normalized to an empty value list
/// - extendable or fixed-option keys with no valid values are dropped
/// - a value list containing [`ALLOW_ALL`] collapses to that sentinel alone
/// - remaining values are de-duplicated and validated per key
pub fn clean_permissions(permissions: &[Permission]) -> Vec<Permission> {
    let mut cleaned = Vec::with_capacity(permissions.len());
    let mut seen_keys = HashSet::new();

    for permission in permissions {
        let key = permission.key.as_str();
        let Some(kind) = permission_kind(key) else {
            continue;
        };
        if seen_keys.contains(key) {
            continue;
        }

        if kind == PermissionKind::Flag {
            seen_keys.insert(key.to_string());
            cleaned.push(Permission::flag(key));
            continue;
        }

        if permission.value.iter().any(|v| v == ALLOW_ALL) {
            seen_keys.insert(key.to_string());
            cleaned.push(Permission::new(key, vec![ALLOW_ALL.to_string()]));
            continue;
        }

        let mut values: Vec<String> = Vec::new();
        for value in &permission.value {
            if is_valid_value(key, kind, value) && !values.contains(value) {
                values.push(value.clone());
            }
        }
        if values.is_empty() {
            continue;
        }
        seen_keys.insert(key.to_string());
        cleaned.push(Permission::new(key, values));
    }
    cleaned
}

/// Flattened view of a cleaned permission list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsSummary {
    pub allow_all: bool,
    pub geolocation: bool,
    pub unlimited_storage: bool,
    pub files: Vec<String>,
    pub game_saves: Vec<String>,
    pub embed_extensions: Vec<String>,
    pub web_request: Vec<String>,
}

impl PermissionsSummary {
    fn everything() -> Self {
        Self {
            allow_all: true,
            geolocation: true,
            unlimited_storage: true,
            files: vec!["read".to_string()],
            game_saves: vec!["read".to_string(), "write".to_string()],
            embed_extensions: vec![ALLOW_ALL.to_string()],
            web_request: vec![ALLOW_ALL.to_string()],
        }
    }

    /// Build a summary from a (cleaned) permission list.
    pub fn from_permissions(permissions: &[Permission]) -> Self {
        let mut summary = Self::default();
        for permission in permissions {
            let value = &permission.value;
            let allow_all = value.iter().any(|v| v == ALLOW_ALL);
            match permission.key.as_str() {
                ALLOW_ALL => return Self::everything(),
                "geolocation" => summary.geolocation = true,
                "unlimitedStorage" => summary.unlimited_storage = true,
                "files" => summary.files = value.clone(),
                "gameSaves" => summary.game_saves = value.clone(),
                "webRequest" if allow_all => summary.web_request = vec![ALLOW_ALL.to_string()],
                "webRequest" => {
                    summary.web_request = value
                        .iter()
                        .filter(|v| !is_dangerous_origin(v))
                        .cloned()
                        .collect();
                }
                "embedExtensions" if allow_all => {
                    summary.embed_extensions = vec![ALLOW_ALL.to_string()]
                }
                "embedExtensions" => summary.embed_extensions = value.clone(),
                _ => {}
            }
        }
        summary
    }

    /// Permissions that warrant an explicit user warning.
    pub fn has_unsafe_permissions(&self) -> bool {
        self.allow_all
            || !self.embed_extensions.is_empty()
            || self.web_request.first().map(String::as_str) == Some(ALLOW_ALL)
    }
}
