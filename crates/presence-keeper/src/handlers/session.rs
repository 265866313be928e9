//! Session handlers.
//!
//! - `POST /api/update-config` - set credential and room, join, start keep-alive
//! - `POST /api/update-cookie` - replace the credential, keep the room
//! - `GET /api/status` - session snapshot
//!
//! Body rejections (malformed JSON, missing content type) are mapped to
//! `PkError::InvalidInput` so every failure carries the same JSON body.
//!
//! # Security
//!
//! Request bodies carry the session cookie as a `SecretString`; it is never
//! logged and never returned.

use crate::errors::PkError;
use crate::models::{
    SessionSnapshot, UpdateConfigRequest, UpdateConfigResponse, UpdateCookieRequest,
};
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Handler for POST /api/update-config
///
/// Errors come straight from `SessionController::configure`: 400 for blank
/// fields or an unreadable body, 401 for a rejected credential, 502/504 for
/// join failures.
#[instrument(skip_all, name = "pk.api.update_config")]
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateConfigRequest>, JsonRejection>,
) -> Result<Json<UpdateConfigResponse>, PkError> {
    let Json(request) = payload?;
    let snapshot = state
        .controller
        .configure(request.cookie, &request.room_id)
        .await?;

    info!(target: "pk.api", room_id = ?snapshot.room_id, "Configuration updated");

    Ok(Json(UpdateConfigResponse {
        success: true,
        message: "Configuration updated".to_string(),
        data: snapshot,
    }))
}

/// Handler for POST /api/update-cookie
///
/// Re-runs configuration with the current room, falling back to
/// `DEFAULT_ROOM_ID`. 400 when neither is known.
#[instrument(skip_all, name = "pk.api.update_cookie")]
pub async fn update_cookie(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateCookieRequest>, JsonRejection>,
) -> Result<Json<UpdateConfigResponse>, PkError> {
    let Json(request) = payload?;
    let room_id = match state.controller.current_room_id().await {
        Some(room_id) => room_id,
        None => state.config.default_room_id.clone().ok_or_else(|| {
            PkError::InvalidInput("roomId is not configured, use /api/update-config".to_string())
        })?,
    };

    let snapshot = state
        .controller
        .configure(request.cookie, &room_id)
        .await?;

    info!(target: "pk.api", room_id = %room_id, "Cookie updated");

    Ok(Json(UpdateConfigResponse {
        success: true,
        message: "Cookie updated".to_string(),
        data: snapshot,
    }))
}

/// Handler for GET /api/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.controller.status().await)
}
