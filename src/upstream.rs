//! Upstream media host client
//!
//! Thin wrapper over a shared `reqwest::Client`: a metadata probe that never
//! fails, and a body fetch that hands back the streaming response.

use axum::http::HeaderMap;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::Result;

/// What a probe learned about a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size in bytes, if the upstream reported one.
    pub size: Option<u64>,
    /// Content type, if the upstream reported one.
    pub content_type: Option<String>,
    /// Whether the probe got a success response.
    pub reachable: bool,
}

/// Client for the upstream media host.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    probe_timeout: Duration,
}

impl UpstreamClient {
    /// Build a client from configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(http, config.probe_timeout()))
    }

    /// Wrap an existing client.
    pub fn with_client(http: reqwest::Client, probe_timeout: Duration) -> Self {
        Self {
            http,
            probe_timeout,
        }
    }

    /// Issue a HEAD request to learn size and type.
    ///
    /// Failures (network, timeout, non-success status) are logged and
    /// reported as an unreachable probe with no metadata.
    pub async fn probe(&self, url: &str) -> ProbeResult {
        let response = self
            .http
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .and_then(|res| res.error_for_status());

        match response {
            Ok(res) => {
                let headers = res.headers();
                let result = ProbeResult {
                    size: header_u64(headers, CONTENT_LENGTH.as_str()),
                    content_type: headers
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    reachable: true,
                };
                tracing::debug!(
                    "Probe {}: size={:?} type={:?}",
                    url,
                    result.size,
                    result.content_type
                );
                result
            }
            Err(e) => {
                tracing::warn!("Probe failed for {}: {}", url, e);
                ProbeResult::default()
            }
        }
    }

    /// Issue a GET for the body, optionally ranged. The response is returned
    /// as soon as headers arrive; the body is left to be streamed.
    pub async fn fetch(&self, url: &str, range: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.http.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }
        Ok(request.send().await?)
    }
}

/// Parse a numeric header. `Content-Length` must be read from the header
/// map: on HEAD responses the body size hint is always zero.
pub fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
