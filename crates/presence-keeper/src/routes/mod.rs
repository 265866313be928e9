//! HTTP routes for Presence Keeper.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, request_timeout_middleware};
use crate::services::session_controller::SessionController;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Owner of the session and its keep-alive task.
    pub controller: Arc<SessionController>,
}

/// Build the application routes.
///
/// - `/health` - liveness
/// - `/metrics` - Prometheus scrape endpoint
/// - `/api/status` - session snapshot
/// - `/api/update-config` - set credential and room
/// - `/api/update-cookie` - replace credential, keep room
///
/// All routes share a TraceLayer, a 30 second timeout and the HTTP metrics
/// middleware (outermost). A timed-out configuration keeps running in the
/// background; its result shows up in `/api/status`.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/status", get(handlers::get_status))
        .route("/api/update-config", post(handlers::update_config))
        .route("/api/update-cookie", post(handlers::update_cookie))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. request_timeout_middleware (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_timeout_middleware))
        .layer(middleware::from_fn(http_metrics_middleware))
}
