//! Request timeout middleware.
//!
//! Bounds every request and answers with the `PkError` JSON body on expiry,
//! so operators never see an empty 408.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::warn;

use crate::errors::PkError;

/// Upper bound for one request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Middleware that abandons the handler after [`REQUEST_TIMEOUT`].
///
/// Work a handler hands off to a spawned task keeps running after the
/// response is sent.
pub async fn request_timeout_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    match tokio::time::timeout(REQUEST_TIMEOUT, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(target: "pk.api", path = %path, "Request timed out");
            PkError::RequestTimeout.into_response()
        }
    }
}
