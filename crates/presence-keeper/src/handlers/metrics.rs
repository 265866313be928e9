//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated, like `/health`. Labels carry no credentials or user IDs.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE pk_http_requests_total counter
/// pk_http_requests_total{method="GET",endpoint="/api/status",status_code="200"} 3
/// ```
#[tracing::instrument(skip_all, name = "pk.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
