//! Typed GET-and-decode over HTTP.
//!
//! One call is one request: no retries and no caching here, callers decide
//! what to do with a failure.

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::FetchError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
            Client::new()
        });
        Self { http }
    }

    /// GET `url` and decode the JSON body into `T`.
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let url = parse_url(url)?;
        tracing::debug!(host = url.host_str().unwrap_or_default(), path = url.path(), "GET");

        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("request failed: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(FetchError::InvalidResponse(format!(
                "status {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
