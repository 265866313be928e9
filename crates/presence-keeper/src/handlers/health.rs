//! Liveness handler.

use crate::models::HealthResponse;
use axum::Json;
use chrono::Utc;

/// Handler for GET /health
///
/// Answers while the process serves requests. Does not look at the session;
/// an unconfigured or disconnected session is still healthy.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}
