//! Presence Keeper error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl and are
//! rendered as `{ "success": false, "message": ... }`. Internal failures are
//! logged server-side and surfaced with a generic message.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::jsonp::JsonpError;
use serde::Serialize;
use thiserror::Error;

/// Presence Keeper error type.
///
/// Maps to HTTP status codes:
/// - InvalidInput: 400 Bad Request
/// - Authentication: 401 Unauthorized
/// - RequestTimeout: 408 Request Timeout
/// - Parse, Remote: 502 Bad Gateway
/// - Network: 504 Gateway Timeout
/// - Internal: 500 Internal Server Error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PkError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unexpected upstream response: {0}")]
    Parse(String),

    #[error("Upstream rejected request (code {code}): {message}")]
    Remote { code: i64, message: String },

    #[error("Upstream unreachable: {0}")]
    Network(String),

    #[error("Request timed out, check /api/status for the session state")]
    RequestTimeout,

    #[error("Internal server error")]
    Internal,
}

impl PkError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            PkError::InvalidInput(_) => 400,
            PkError::Authentication(_) => 401,
            PkError::Parse(_) | PkError::Remote { .. } => 502,
            PkError::Network(_) => 504,
            PkError::RequestTimeout => 408,
            PkError::Internal => 500,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PkError::InvalidInput(_) => "invalid_input",
            PkError::Authentication(_) => "authentication",
            PkError::Parse(_) => "parse",
            PkError::Remote { .. } => "remote",
            PkError::Network(_) => "network",
            PkError::RequestTimeout => "request_timeout",
            PkError::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl IntoResponse for PkError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            PkError::Internal => {
                tracing::error!(target: "pk.errors", "Internal error while handling request");
                "An internal error occurred".to_string()
            }
            PkError::Network(reason) => {
                tracing::warn!(target: "pk.errors", reason = %reason, "Upstream unreachable");
                self.to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

/// Convert JSONP decoding errors to PkError.
impl From<JsonpError> for PkError {
    fn from(err: JsonpError) -> Self {
        PkError::Parse(err.to_string())
    }
}

/// Convert JSON body rejections (malformed JSON, wrong content type) to PkError.
impl From<JsonRejection> for PkError {
    fn from(rejection: JsonRejection) -> Self {
        PkError::InvalidInput(rejection.body_text())
    }
}

/// Convert transport errors to PkError.
impl From<reqwest::Error> for PkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PkError::Network("upstream request timed out".to_string())
        } else if err.is_connect() {
            PkError::Network("could not connect to upstream".to_string())
        } else {
            PkError::Network(err.without_url().to_string())
        }
    }
}
