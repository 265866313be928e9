//! Metrics definitions for Presence Keeper.
//!
//! All metrics follow Prometheus naming conventions:
//! - `pk_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: the fixed operator routes, anything else is `/other`
//! - `status`: success, error, timeout (HTTP); success, http_error, timeout,
//!   network_error (upstream)
//! - `operation`: bounded by code (lookup_identity, ping, report, bootstrap_step)
//! - `outcome`: bounded by `TickOutcome` variants

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("pk_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Upstream calls are bounded by UPSTREAM_TIMEOUT_SECONDS (max 60s)
        .set_buckets_for_metric(
            Matcher::Prefix("pk_upstream_request".to_string()),
            &[
                0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000, 60.000,
            ],
        )
        .map_err(|e| format!("Failed to set upstream request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `pk_http_requests_total`, `pk_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
///
/// Captures framework-level rejections (400 on bad JSON, 404, 405) as well
/// as handler responses.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("pk_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("pk_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// The operator API has no dynamic segments, so anything outside the known
/// routes collapses to `/other`.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/status" => "/api/status",
        "/api/update-config" => "/api/update-config",
        "/api/update-cookie" => "/api/update-cookie",
        _ => "/other",
    }
}

// ============================================================================
// Upstream Metrics
// ============================================================================

/// Record an outbound call to the upstream platform.
///
/// Metric: `pk_upstream_requests_total`, `pk_upstream_request_duration_seconds`
/// Labels: `operation`, `status`
///
/// `status` is `success`, `http_error`, `timeout` or `network_error`.
pub fn record_upstream_request(operation: &str, status: &str, duration: Duration) {
    histogram!("pk_upstream_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("pk_upstream_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Keep-alive Metrics
// ============================================================================

/// Metric: `pk_keepalive_ticks_total`
/// Labels: `outcome`
pub fn record_keepalive_tick(outcome: &str) {
    counter!("pk_keepalive_ticks_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Metric: `pk_reconnects_total`
/// Labels: `status`
pub fn record_reconnect(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("pk_reconnects_total",
        "status" => status
    )
    .increment(1);
}

/// Metric: `pk_session_connected` (1 when the session is joined, else 0)
pub fn set_session_connected(connected: bool) {
    gauge!("pk_session_connected").set(if connected { 1.0 } else { 0.0 });
}
