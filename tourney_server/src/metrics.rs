//! Prometheus metrics export.
//!
//! The library records its own counters through the `metrics` facade
//! (`tournament_status_transitions_total`, `brackets_generated_total`,
//! `match_results_recorded_total`, `scheduler_ticks_total`). This module
//! installs the exporter and adds the HTTP and WebSocket series.
//!
//! ```rust,no_run
//! use tourney_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("GET", "/api/v1/tournaments/{id}", 200);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter.
///
/// Metrics are served at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record an HTTP request by method, matched route and status.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

pub fn websocket_connected() {
    metrics::counter!("websocket_connections_total").increment(1);
    metrics::gauge!("websocket_connections_active").increment(1.0);
}

pub fn websocket_disconnected() {
    metrics::gauge!("websocket_connections_active").decrement(1.0);
}

/// Increment room messages pushed to clients.
pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

// ============================================================================
// Tournament Metrics
// ============================================================================

/// Record a request-driven status change attempt.
pub fn status_requests_total(target: &str, success: bool) {
    metrics::counter!("status_requests_total",
        "target" => target.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}
