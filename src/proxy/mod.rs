//! Range streaming proxy
//!
//! Serves one client request against one upstream resource:
//! - probe the upstream for size and type (advisory, may fail)
//! - parse and validate the client's `Range` header
//! - open a single upstream transfer, ranged or not
//! - relay its body with client-facing 200 / 206 / 416 semantics

pub mod session;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::stream;
use std::io;
use std::sync::Arc;

use crate::catalog::{VideoResource, DEFAULT_CONTENT_TYPE};
use crate::error::{ProxyError, Result};
use crate::metrics::Metrics;
use crate::range::{parse_content_range, ByteRangeRequest, ResolvedRange};
use crate::upstream::{header_u64, UpstreamClient};

pub use session::StreamSession;

/// What a request resolved to before any body is fetched.
struct TransferPlan<'a> {
    url: &'a str,
    content_type: HeaderValue,
    size: Option<u64>,
    request: Option<ByteRangeRequest>,
}

/// The range-aware streaming proxy.
#[derive(Clone)]
pub struct RangeProxy {
    upstream: UpstreamClient,
    chunk_size: usize,
    metrics: Arc<Metrics>,
}

impl RangeProxy {
    pub fn new(upstream: UpstreamClient, chunk_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            upstream,
            chunk_size,
            metrics,
        }
    }

    /// Serve `resource`, honouring the client's `Range` header if present.
    pub async fn serve(
        &self,
        resource: &VideoResource,
        range_header: Option<&HeaderValue>,
    ) -> Result<Response> {
        let plan = self.prepare(resource, range_header).await?;
        match plan.request {
            None => {
                self.full_transfer(plan.url, plan.content_type, plan.size)
                    .await
            }
            Some(request) => {
                self.partial_transfer(plan.url, plan.content_type, plan.size, request)
                    .await
            }
        }
    }

    /// Answer a HEAD request from the probe alone. Status and headers match
    /// what `serve` would send when the size is known; no body is fetched.
    pub async fn describe(
        &self,
        resource: &VideoResource,
        range_header: Option<&HeaderValue>,
    ) -> Result<Response> {
        let plan = self.prepare(resource, range_header).await?;
        let builder = Response::builder()
            .header(header::CONTENT_TYPE, plan.content_type)
            .header(header::ACCEPT_RANGES, "bytes");

        let (builder, length) = match plan.request {
            None => (builder.status(StatusCode::OK), plan.size),
            Some(request) => {
                let range = request
                    .resolve(plan.size)
                    .map_err(|_| ProxyError::RangeNotSatisfiable { size: plan.size })?;
                let builder = builder
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, range.to_string());
                (builder, range.content_length())
            }
        };
        match length {
            Some(length) => Ok(builder
                .header(header::CONTENT_LENGTH, length)
                .body(Body::empty())?),
            // A sized empty body would be advertised as `Content-Length: 0`.
            None => Ok(builder.body(Body::from_stream(stream::empty::<io::Result<Bytes>>()))?),
        }
    }

    /// Probe the upstream and validate the client's range.
    async fn prepare<'a>(
        &self,
        resource: &'a VideoResource,
        range_header: Option<&HeaderValue>,
    ) -> Result<TransferPlan<'a>> {
        let url = resource
            .upstream_url()
            .ok_or_else(|| ProxyError::MissingUpstreamReference(resource.identifier.clone()))?;

        let probe = self.upstream.probe(url).await;
        if !probe.reachable {
            self.metrics.record_probe_failure();
        }
        let content_type = content_type_header(
            probe
                .content_type
                .as_deref()
                .unwrap_or(&resource.content_type),
        );

        // An empty Range header counts as no Range header; one that is not
        // even visible ASCII is malformed.
        let request = match range_header.map(HeaderValue::to_str) {
            None => None,
            Some(Ok(value)) if value.trim().is_empty() => None,
            Some(Ok(value)) => Some(ByteRangeRequest::parse(value).map_err(|_| {
                tracing::debug!("Malformed range '{}' for {}", value, resource.identifier);
                ProxyError::RangeNotSatisfiable { size: probe.size }
            })?),
            Some(Err(_)) => {
                tracing::debug!("Unreadable range header for {}", resource.identifier);
                return Err(ProxyError::RangeNotSatisfiable { size: probe.size });
            }
        };

        Ok(TransferPlan {
            url,
            content_type,
            size: probe.size,
            request,
        })
    }

    async fn full_transfer(
        &self,
        url: &str,
        content_type: HeaderValue,
        size: Option<u64>,
    ) -> Result<Response> {
        let session = StreamSession::new(url, self.chunk_size, self.metrics.clone());
        tracing::info!("[{}] Full transfer of {} (size {:?})", session.id(), url, size);

        let body = match self.upstream.fetch(url, None).await {
            Ok(res) if res.status().is_success() => session.relay(res, 0, size),
            Ok(res) => {
                tracing::warn!("Upstream {} answered {}", url, res.status());
                session.abandon()
            }
            Err(e) => {
                tracing::warn!("Upstream request to {} failed: {}", url, e);
                session.abandon()
            }
        };

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes");
        if let Some(size) = size {
            builder = builder.header(header::CONTENT_LENGTH, size);
        }
        Ok(builder.body(body)?)
    }

    async fn partial_transfer(
        &self,
        url: &str,
        content_type: HeaderValue,
        size: Option<u64>,
        request: ByteRangeRequest,
    ) -> Result<Response> {
        // A start past the known end never reaches the upstream.
        let requested = request
            .resolve(size)
            .map_err(|_| ProxyError::RangeNotSatisfiable { size })?;

        let session = StreamSession::new(url, self.chunk_size, self.metrics.clone());
        let upstream_range = requested.upstream_header();
        tracing::info!("[{}] Partial transfer of {} ({})", session.id(), url, upstream_range);

        let (range, body) = match self.upstream.fetch(url, Some(&upstream_range)).await {
            Ok(res) => negotiate(request, requested, res, session)?,
            Err(e) => {
                tracing::warn!("Upstream request to {} failed: {}", url, e);
                (requested, session.abandon())
            }
        };

        let mut builder = Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_RANGE, range.to_string());
        if let Some(length) = range.content_length() {
            builder = builder.header(header::CONTENT_LENGTH, length);
        }
        Ok(builder.body(body)?)
    }
}

/// Reconcile what we asked for with what the upstream answered, and choose
/// how to relay its body.
///
/// With a known size the client-facing range is already fixed and the
/// upstream only has to deliver it. With an unknown size the upstream's
/// answer decides the bounds.
fn negotiate(
    request: ByteRangeRequest,
    requested: ResolvedRange,
    res: reqwest::Response,
    session: StreamSession,
) -> Result<(ResolvedRange, Body)> {
    let status = res.status();

    if status == StatusCode::PARTIAL_CONTENT {
        let answered = res
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        return match answered {
            Some(answered) if answered.start != requested.start => {
                tracing::warn!(
                    "Upstream answered {} for a request starting at {}",
                    answered,
                    requested.start
                );
                Ok((requested, session.abandon()))
            }
            Some(answered) if requested.size.is_none() => {
                let limit = answered.byte_count();
                Ok((answered, session.relay(res, 0, limit)))
            }
            _ => {
                let limit = requested.byte_count();
                Ok((requested, session.relay(res, 0, limit)))
            }
        };
    }

    if status == StatusCode::OK {
        // The upstream ignored the range: drop the leading bytes here.
        let range = match requested.size {
            Some(_) => requested,
            None => match header_u64(res.headers(), header::CONTENT_LENGTH.as_str()) {
                Some(total) => request
                    .resolve(Some(total))
                    .map_err(|_| ProxyError::RangeNotSatisfiable { size: Some(total) })?,
                None => requested,
            },
        };
        let limit = range.byte_count();
        return Ok((range, session.relay(res, range.start, limit)));
    }

    if status == StatusCode::RANGE_NOT_SATISFIABLE && requested.size.is_none() {
        let size = res
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().strip_prefix("bytes */"))
            .and_then(|v| v.parse().ok());
        return Err(ProxyError::RangeNotSatisfiable { size });
    }

    tracing::warn!("Upstream answered {} to a ranged request", status);
    Ok((requested, session.abandon()))
}

fn content_type_header(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}
