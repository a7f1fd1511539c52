//! reqwest-backed [`NetworkFetch`] adaptor.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{FetchError, FetchRequest, FetchResponse, Method, NetworkFetch};
use crate::config::DownloadConfig;

/// Default User-Agent string for HTTP requests.
const DEFAULT_USER_AGENT: &str = concat!("stowage/", env!("CARGO_PKG_VERSION"));

/// Async HTTP client using reqwest.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    /// Creates a client with the default download configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(&DownloadConfig::default())
    }

    /// Creates a client with a custom timeout.
    pub fn with_config(config: &DownloadConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs()))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(config.concurrency())
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl NetworkFetch for ReqwestFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url;
        trace!(url = %url, method = ?request.method, "HTTP request starting");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Head => self.client.head(&url),
        };

        let response = match builder.send().await {
            Ok(resp) => {
                debug!(
                    url = %url,
                    status = resp.status().as_u16(),
                    "HTTP response received"
                );
                resp
            }
            Err(e) => {
                warn!(
                    url = %url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(FetchError::Request {
                    url,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = match request.method {
            Method::Head => Vec::new(),
            Method::Get => match response.bytes().await {
                Ok(bytes) => {
                    trace!(url = %url, bytes = bytes.len(), "HTTP response body read");
                    bytes.to_vec()
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to read response body");
                    return Err(FetchError::Body {
                        url,
                        reason: e.to_string(),
                    });
                }
            },
        };

        Ok(FetchResponse {
            status,
            url: final_url,
            headers,
            body,
        })
    }
}
