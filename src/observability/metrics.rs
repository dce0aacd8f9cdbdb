//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pass_requests_total` (counter): forwarded requests by upstream, method, status
//! - `pass_request_duration_seconds` (histogram): upstream round-trip latency
//! - `pass_upstream_errors_total` (counter): failures by upstream and kind
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus
//! recorder, so library users pay nothing unless the binary opts in.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "pass_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "pass_request_duration_seconds";
pub const UPSTREAM_ERRORS_TOTAL: &str = "pass_upstream_errors_total";

/// Install the global recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_counter!(REQUESTS_TOTAL, "Requests forwarded to upstreams");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Upstream round-trip latency"
    );
    describe_counter!(UPSTREAM_ERRORS_TOTAL, "Failed upstream round trips");

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a completed forward.
pub fn record_forward(upstream: &str, method: &str, status: u16, start: Instant) {
    counter!(
        REQUESTS_TOTAL,
        "upstream" => upstream.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "upstream" => upstream.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(upstream: &str, kind: &'static str) {
    counter!(
        UPSTREAM_ERRORS_TOTAL,
        "upstream" => upstream.to_string(),
        "kind" => kind
    )
    .increment(1);
}
