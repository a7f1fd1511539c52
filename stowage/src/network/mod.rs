//! Network access port.
//!
//! The client never talks to the network directly; it goes through a
//! [`NetworkFetch`] implementation. [`ReqwestFetch`] is the production
//! adaptor, tests substitute in-memory fakes.

mod http;

pub use http::ReqwestFetch;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

/// HTTP method subset used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A request handed to a [`NetworkFetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Head,
        }
    }
}

/// A fully-read response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Header names are lower-case.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters (`text/html; charset=utf-8` → `text/html`).
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }
}

/// Network-level failure (no HTTP response was obtained).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("failed to read body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// Performs HTTP requests on behalf of the engine.
///
/// Implementations must follow redirects and report the final URL in
/// [`FetchResponse::url`]. Non-2xx statuses are responses, not errors.
pub trait NetworkFetch: Send + Sync {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

impl<T: NetworkFetch> NetworkFetch for Arc<T> {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        (**self).fetch(request)
    }
}

/// Fetch with a bounded number of attempts.
///
/// Retries on network errors and non-2xx responses; the last outcome is
/// returned when every attempt fails.
pub async fn fetch_with_retry<N: NetworkFetch>(
    network: &N,
    request: FetchRequest,
    attempts: usize,
) -> Result<FetchResponse, FetchError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = network.fetch(request.clone()).await;
        let retryable = match &outcome {
            Ok(response) => !response.is_success(),
            Err(_) => true,
        };
        if !retryable || attempt >= attempts {
            return outcome;
        }
        match &outcome {
            Ok(response) => debug!(
                url = %request.url,
                status = response.status,
                attempt,
                "Retrying request after error status"
            ),
            Err(e) => warn!(url = %request.url, error = %e, attempt, "Retrying failed request"),
        }
        attempt += 1;
    }
}
