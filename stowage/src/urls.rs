//! URL helpers shared by the manifest model and the client.

use reqwest::Url;

/// Append a trailing slash if missing.
pub fn add_slash_to_end(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Remove a single trailing slash.
pub fn remove_slash_at_end(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Strip a leading `/` or `./` from a manifest-relative path.
pub fn strip_relative_path(path: &str) -> &str {
    if let Some(rest) = path.strip_prefix("./") {
        rest
    } else if let Some(rest) = path.strip_prefix('/') {
        rest
    } else {
        path
    }
}

/// True for text starting with an http(s) scheme.
pub fn is_cross_origin(path: &str) -> bool {
    path.starts_with("https://") || path.starts_with("http://")
}

/// Parse an absolute http(s) URL.
pub fn parse_http_url(text: &str) -> Option<Url> {
    let url = Url::parse(text).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Directory part of a URL: everything up to and including the last `/`
/// of the path, without query or fragment.
pub fn base_url(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    let path = base.path().to_string();
    let dir = match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "/",
    };
    base.set_path(dir);
    base.to_string()
}

/// Last path segment of a URL, if any.
pub fn file_name(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
}

/// Guess a MIME type from a URL's file extension. Unknown types map to
/// `text/plain`.
pub fn mime_for_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    let extension = match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => return "text/plain",
    };
    match extension.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" | "md" => "text/plain",
        "xml" => "application/xml",
        "zip" => "application/zip",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_relative_path() {
        assert_eq!(strip_relative_path("/index.js"), "index.js");
        assert_eq!(strip_relative_path("./index.js"), "index.js");
        assert_eq!(strip_relative_path("assets/a.png"), "assets/a.png");
    }

    #[test]
    fn test_slashes() {
        assert_eq!(add_slash_to_end("https://a.com"), "https://a.com/");
        assert_eq!(add_slash_to_end("https://a.com/"), "https://a.com/");
        assert_eq!(remove_slash_at_end("https://a.com/"), "https://a.com");
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://a.com/x.json").is_some());
        assert!(parse_http_url("ftp://a.com/x.json").is_none());
        assert!(parse_http_url("a.com/x.json").is_none());
    }

    #[test]
    fn test_base_url_and_file_name() {
        let url = Url::parse("https://cdn.a.com/pkg/v2/stowage.json?x=1").unwrap();
        assert_eq!(base_url(&url), "https://cdn.a.com/pkg/v2/");
        assert_eq!(file_name(&url), Some("stowage.json"));

        let root = Url::parse("https://a.com/").unwrap();
        assert_eq!(base_url(&root), "https://a.com/");
        assert_eq!(file_name(&root), None);
    }

    #[test]
    fn test_mime_for_url() {
        assert_eq!(mime_for_url("https://a.com/index.js"), "text/javascript");
        assert_eq!(mime_for_url("https://a.com/logo.PNG"), "image/png");
        assert_eq!(mime_for_url("https://a.com/LICENSE"), "text/plain");
        assert_eq!(mime_for_url("https://a.com/data.bin"), "text/plain");
    }
}
