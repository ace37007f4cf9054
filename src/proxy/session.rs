//! Per-request stream session
//!
//! A `StreamSession` owns the upstream body for one client request and
//! yields it back as bounded chunks. Dropping the session drops the upstream
//! response, which releases its connection; this happens on completion, on
//! upstream failure, and when hyper drops the client body after a
//! disconnect.

use axum::body::Body;
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use uuid::Uuid;

use crate::metrics::Metrics;

pub type UpstreamBody = BoxStream<'static, io::Result<Bytes>>;

pub struct StreamSession {
    id: Uuid,
    url: String,
    chunk_size: usize,
    metrics: Arc<Metrics>,
    upstream: Option<UpstreamBody>,
    /// Bytes received from the upstream but not yet handed out.
    pending: Bytes,
    /// Leading upstream bytes to discard (upstream ignored our range).
    skip: u64,
    /// Bytes still owed to the client, when bounded.
    remaining: Option<u64>,
    relayed: u64,
    finished: bool,
}

impl StreamSession {
    pub fn new(url: &str, chunk_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            chunk_size: chunk_size.max(1),
            metrics,
            upstream: None,
            pending: Bytes::new(),
            skip: 0,
            remaining: None,
            relayed: 0,
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Bind an upstream body to this session. `skip` leading bytes are
    /// discarded and at most `limit` bytes are relayed.
    pub fn attach(mut self, upstream: UpstreamBody, skip: u64, limit: Option<u64>) -> Self {
        self.upstream = Some(upstream);
        self.skip = skip;
        self.remaining = limit;
        self
    }

    /// Relay an upstream response as the client body.
    pub fn relay(self, response: reqwest::Response, skip: u64, limit: Option<u64>) -> Body {
        let upstream = response.bytes_stream().map_err(io::Error::other).boxed();
        Body::from_stream(self.attach(upstream, skip, limit))
    }

    /// Give up before any byte was relayed. The client gets an empty body.
    pub fn abandon(mut self) -> Body {
        tracing::warn!("[{}] No body relayed for {}", self.id, self.url);
        self.metrics.record_truncated();
        self.finished = true;
        Body::empty()
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.upstream = None;
        self.pending = Bytes::new();

        if matches!(self.remaining, Some(n) if n > 0) {
            tracing::warn!(
                "[{}] Upstream {} closed {} bytes short after {} bytes",
                self.id,
                self.url,
                self.remaining.unwrap_or_default(),
                self.relayed
            );
            self.metrics.record_truncated();
        } else {
            tracing::debug!("[{}] Relayed {} bytes from {}", self.id, self.relayed, self.url);
        }
    }

    fn fail(&mut self, err: io::Error) {
        tracing::warn!(
            "[{}] Upstream {} failed after {} bytes: {}",
            self.id,
            self.url,
            self.relayed,
            err
        );
        self.metrics.record_truncated();
        self.finished = true;
        self.upstream = None;
        self.pending = Bytes::new();
    }

    /// Take the next chunk out of `pending`, honouring chunk size and limit.
    fn next_chunk(&mut self) -> Bytes {
        let mut n = self.pending.len().min(self.chunk_size);
        if let Some(remaining) = self.remaining {
            n = n.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        let chunk = self.pending.split_to(n);
        self.relayed += n as u64;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= n as u64;
        }
        self.metrics.record_bytes(n as u64);
        chunk
    }
}

impl Stream for StreamSession {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }
            if this.remaining == Some(0) {
                this.finish();
                return Poll::Ready(None);
            }
            if !this.pending.is_empty() {
                return Poll::Ready(Some(Ok(this.next_chunk())));
            }

            let Some(upstream) = this.upstream.as_mut() else {
                this.finish();
                return Poll::Ready(None);
            };

            match upstream.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(mut bytes))) => {
                    if this.skip > 0 {
                        let n = bytes.len().min(usize::try_from(this.skip).unwrap_or(usize::MAX));
                        let _ = bytes.split_to(n);
                        this.skip -= n as u64;
                    }
                    this.pending = bytes;
                }
                Poll::Ready(Some(Err(e))) => {
                    // The client sees a short body rather than an error.
                    this.fail(e);
                    return Poll::Ready(None);
                }
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.finished && self.upstream.is_some() {
            tracing::debug!(
                "[{}] Client went away after {} bytes, releasing {}",
                self.id,
                self.relayed,
                self.url
            );
            self.metrics.record_aborted();
        }
    }
}
