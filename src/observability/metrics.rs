//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_backend_health` (gauge): 1=alive, 0=dead, per backend

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP exposition endpoint.
///
/// Metric macros degrade to no-ops when this was never called (tests,
/// metrics disabled), so recording sites don't guard on it.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request outcome.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
        Label::new("backend", backend.to_string()),
    ];
    counter!("proxy_requests_total", labels.clone()).increment(1);
    histogram!("proxy_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}

/// Record a backend's current liveness.
pub fn record_backend_health(backend: &str, alive: bool) {
    let value = if alive { 1.0 } else { 0.0 };
    gauge!("proxy_backend_health", "backend" => backend.to_string()).set(value);
}
