//! Prometheus-compatible metrics endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::state::AppState;

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Server start time
    start_time: Instant,
    /// Total requests processed
    request_count: AtomicU64,
    /// Requests by endpoint
    requests_by_endpoint: RwLock<HashMap<String, u64>>,
    /// Responses by status code
    responses_by_status: RwLock<HashMap<u16, u64>>,
    /// Total bytes relayed to clients
    bytes_relayed: AtomicU64,
    /// Probes that fell back to defaults
    probe_failures: AtomicU64,
    /// Relays cut short by the upstream
    truncated_relays: AtomicU64,
    /// Relays dropped because the client went away
    aborted_relays: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            requests_by_endpoint: RwLock::new(HashMap::new()),
            responses_by_status: RwLock::new(HashMap::new()),
            bytes_relayed: AtomicU64::new(0),
            probe_failures: AtomicU64::new(0),
            truncated_relays: AtomicU64::new(0),
            aborted_relays: AtomicU64::new(0),
        }
    }

    /// Record a request
    pub fn record_request(&self, endpoint: &str) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        *self
            .requests_by_endpoint
            .write()
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    /// Record a response status
    pub fn record_status(&self, status: StatusCode) {
        *self
            .responses_by_status
            .write()
            .entry(status.as_u16())
            .or_insert(0) += 1;
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_relayed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_truncated(&self) {
        self.truncated_relays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted(&self) {
        self.aborted_relays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed.load(Ordering::Relaxed)
    }

    pub fn probe_failures(&self) -> u64 {
        self.probe_failures.load(Ordering::Relaxed)
    }

    pub fn truncated_relays(&self) -> u64 {
        self.truncated_relays.load(Ordering::Relaxed)
    }

    pub fn aborted_relays(&self) -> u64 {
        self.aborted_relays.load(Ordering::Relaxed)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP video_proxy_uptime_seconds Server uptime in seconds\n");
        output.push_str("# TYPE video_proxy_uptime_seconds counter\n");
        output.push_str(&format!(
            "video_proxy_uptime_seconds {}\n",
            self.uptime_secs()
        ));

        output.push_str(
            "\n# HELP video_proxy_start_time_seconds Server start time as Unix timestamp\n",
        );
        output.push_str("# TYPE video_proxy_start_time_seconds gauge\n");
        output.push_str(&format!(
            "video_proxy_start_time_seconds {}\n",
            std::time::SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or(Duration::ZERO)
                .as_secs()
                .saturating_sub(self.uptime_secs())
        ));

        // Request metrics
        output.push_str("\n# HELP video_proxy_requests_total Total number of HTTP requests\n");
        output.push_str("# TYPE video_proxy_requests_total counter\n");
        output.push_str(&format!(
            "video_proxy_requests_total {}\n",
            self.request_count.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP video_proxy_requests_by_endpoint Requests by endpoint\n");
        output.push_str("# TYPE video_proxy_requests_by_endpoint counter\n");
        for (endpoint, count) in self.requests_by_endpoint.read().iter() {
            output.push_str(&format!(
                "video_proxy_requests_by_endpoint{{endpoint=\"{}\"}} {}\n",
                endpoint, count
            ));
        }

        output.push_str("\n# HELP video_proxy_responses_total Responses by status code\n");
        output.push_str("# TYPE video_proxy_responses_total counter\n");
        for (status, count) in self.responses_by_status.read().iter() {
            output.push_str(&format!(
                "video_proxy_responses_total{{status=\"{}\"}} {}\n",
                status, count
            ));
        }

        // Relay metrics
        output.push_str("\n# HELP video_proxy_bytes_relayed_total Total bytes relayed to clients\n");
        output.push_str("# TYPE video_proxy_bytes_relayed_total counter\n");
        output.push_str(&format!(
            "video_proxy_bytes_relayed_total {}\n",
            self.bytes_relayed()
        ));

        output.push_str(
            "\n# HELP video_proxy_probe_failures_total Upstream probes that fell back to defaults\n",
        );
        output.push_str("# TYPE video_proxy_probe_failures_total counter\n");
        output.push_str(&format!(
            "video_proxy_probe_failures_total {}\n",
            self.probe_failures()
        ));

        output.push_str(
            "\n# HELP video_proxy_truncated_relays_total Relays cut short by upstream failure\n",
        );
        output.push_str("# TYPE video_proxy_truncated_relays_total counter\n");
        output.push_str(&format!(
            "video_proxy_truncated_relays_total {}\n",
            self.truncated_relays()
        ));

        output.push_str(
            "\n# HELP video_proxy_aborted_relays_total Relays dropped by client disconnect\n",
        );
        output.push_str("# TYPE video_proxy_aborted_relays_total counter\n");
        output.push_str(&format!(
            "video_proxy_aborted_relays_total {}\n",
            self.aborted_relays()
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let prometheus_output = state.metrics.export_prometheus();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        prometheus_output,
    )
        .into_response()
}
