//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::file::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[client]
; Local storage namespace. Every stored file and index lives under this origin.
origin = {}
; File name of the manifest published at each bundle base URL
manifest_name = {}
; File name of the version-only mini manifest published next to the manifest
mini_manifest_name = {}
; Invalidation applied to files that declare "default":
;   url-diff - only fetch files whose name is new
;   purge    - always refetch
default_invalidation = {}

[storage]
; Root directory of the on-disk file cache
directory = {}
; Total bytes the cache may use (supports KB, MB, GB, TB suffixes)
quota = {}
; Part of the quota held back from bundle storage
reserved = {}

[download]
; Per-request timeout in seconds
timeout = {}
; Concurrent resource fetches per download job
concurrency = {}

[poller]
; Progress poll interval in milliseconds
interval_ms = {}
"#,
        config.client.origin,
        config.client.manifest_name,
        config.client.mini_manifest_name,
        config.client.default_invalidation.as_str(),
        path_to_string(&config.storage.directory),
        format_size(config.storage.quota),
        format_size(config.storage.reserved),
        config.download.timeout,
        config.download.concurrency,
        config.poller.interval_ms,
    )
}

fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
