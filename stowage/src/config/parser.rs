//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::file::{ConfigFile, ConfigFileError};
use super::size::parse_size;
use crate::manifest::InvalidationStrategy;
use crate::urls::{parse_http_url, remove_slash_at_end};

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [client] section
    if let Some(section) = ini.section(Some("client")) {
        if let Some(v) = section.get("origin") {
            let v = v.trim();
            if parse_http_url(v).is_none() {
                return Err(invalid(
                    "client",
                    "origin",
                    v,
                    "must be an absolute http(s) URL",
                ));
            }
            config.client.origin = remove_slash_at_end(v).to_string();
        }
        if let Some(v) = section.get("manifest_name") {
            let v = v.trim();
            if v.is_empty() || v.contains('/') {
                return Err(invalid("client", "manifest_name", v, "must be a bare file name"));
            }
            config.client.manifest_name = v.to_string();
        }
        if let Some(v) = section.get("mini_manifest_name") {
            let v = v.trim();
            if v.is_empty() || v.contains('/') {
                return Err(invalid(
                    "client",
                    "mini_manifest_name",
                    v,
                    "must be a bare file name",
                ));
            }
            config.client.mini_manifest_name = v.to_string();
        }
        if let Some(v) = section.get("default_invalidation") {
            let v = v.trim().to_lowercase();
            config.client.default_invalidation = match v.as_str() {
                "url-diff" => InvalidationStrategy::UrlDiff,
                "purge" => InvalidationStrategy::Purge,
                _ => {
                    return Err(invalid(
                        "client",
                        "default_invalidation",
                        &v,
                        "must be 'url-diff' or 'purge'",
                    ));
                }
            };
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.storage.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("quota") {
            config.storage.quota = parse_size(v).map_err(|_| {
                invalid(
                    "storage",
                    "quota",
                    v,
                    "expected format like '10GB', '500MB', or '1024KB'",
                )
            })?;
        }
        if let Some(v) = section.get("reserved") {
            config.storage.reserved = parse_size(v).map_err(|_| {
                invalid(
                    "storage",
                    "reserved",
                    v,
                    "expected format like '200MB' or '0'",
                )
            })?;
        }
    }

    // [download] section
    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("timeout") {
            config.download.timeout = match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(invalid(
                        "download",
                        "timeout",
                        v,
                        "must be a positive integer (seconds)",
                    ))
                }
            };
        }
        if let Some(v) = section.get("concurrency") {
            config.download.concurrency = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(invalid(
                        "download",
                        "concurrency",
                        v,
                        "must be a positive integer",
                    ))
                }
            };
        }
    }

    // [poller] section
    if let Some(section) = ini.section(Some("poller")) {
        if let Some(v) = section.get("interval_ms") {
            config.poller.interval_ms = match v.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return Err(invalid(
                        "poller",
                        "interval_ms",
                        v,
                        "must be a positive integer (milliseconds)",
                    ))
                }
            };
        }
    }

    Ok(config)
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::{DEFAULT_MANIFEST_NAME, DEFAULT_POLL_INTERVAL_MS};

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_client_section() {
        let config = parse(
            "[client]\norigin = https://games.example.com/\nmanifest_name = bundle.json\ndefault_invalidation = purge\n",
        )
        .unwrap();
        assert_eq!(config.client.origin, "https://games.example.com");
        assert_eq!(config.client.manifest_name, "bundle.json");
        assert_eq!(
            config.client.default_invalidation,
            InvalidationStrategy::Purge
        );
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let err = parse("[client]\norigin = games.example.com\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { ref key, .. } if key == "origin"));
    }

    #[test]
    fn test_invalid_manifest_name_rejected() {
        assert!(parse("[client]\nmanifest_name = a/b.json\n").is_err());
        let config = parse("[client]\n").unwrap();
        assert_eq!(config.client.manifest_name, DEFAULT_MANIFEST_NAME);
    }

    #[test]
    fn test_default_invalidation_cannot_be_default() {
        assert!(parse("[client]\ndefault_invalidation = default\n").is_err());
    }

    #[test]
    fn test_storage_sizes() {
        let config = parse("[storage]\nquota = 2GB\nreserved = 0\n").unwrap();
        assert_eq!(config.storage.quota, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.storage.reserved, 0);
        assert!(parse("[storage]\nquota = lots\n").is_err());
    }

    #[test]
    fn test_download_and_poller() {
        let config = parse("[download]\ntimeout = 10\nconcurrency = 2\n[poller]\ninterval_ms = 250\n")
            .unwrap();
        assert_eq!(config.download.timeout, 10);
        assert_eq!(config.download.concurrency, 2);
        assert_eq!(config.poller.interval_ms, 250);
        assert!(parse("[download]\nconcurrency = 0\n").is_err());
        assert_eq!(
            parse("[poller]\n").unwrap().poller.interval_ms,
            DEFAULT_POLL_INTERVAL_MS
        );
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/var/cache"), PathBuf::from("/var/cache"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/stowage"), home.join("stowage"));
        }
    }
}
