//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define host metrics (requests, latency, forwards, reloads)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `collection_host_requests_total` (counter): requests by method, status
//! - `collection_host_request_duration_seconds` (histogram): dispatch latency
//! - `collection_host_forwards_total` (counter): forward hops
//! - `collection_host_reloads_total` (counter): watcher reloads by kind
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed (tests, `--metrics` off)
//! - Labels stay low-cardinality: no paths, no collection names

use std::net::SocketAddr;
use std::time::Duration;
use axum::http::{Method, StatusCode};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "collection_host_requests_total";
pub const REQUEST_DURATION: &str = "collection_host_request_duration_seconds";
pub const FORWARDS_TOTAL: &str = "collection_host_forwards_total";
pub const RELOADS_TOTAL: &str = "collection_host_reloads_total";

/// Install the Prometheus recorder and its HTTP listener. Needs a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &Method, status: StatusCode, elapsed: Duration) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.as_str().to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION).record(elapsed.as_secs_f64());
}

pub fn record_forward() {
    metrics::counter!(FORWARDS_TOTAL).increment(1);
}

pub fn record_reload(kind: &'static str) {
    metrics::counter!(RELOADS_TOTAL, "kind" => kind).increment(1);
}
