//! Presence Keeper models.
//!
//! Request/response bodies for the operator API and the data types shared
//! between the controller and the upstream adapter.

use chrono::{DateTime, Utc};
use common::secret::SecretString;
use serde::{Deserialize, Serialize};

/// Identity of the upstream account behind a credential.
///
/// Cached on the session after a successful identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Upstream user ID.
    pub user_id: String,

    /// Upstream display name.
    pub display_name: String,
}

/// Read-only view of the session.
///
/// Returned by `GET /api/status` and as the `data` of a successful config
/// update. Never carries the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub is_connected: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_report: Option<DateTime<Utc>>,
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub nickname: Option<String>,
    pub retry_count: u32,
    pub start_time: DateTime<Utc>,
    /// Seconds since `start_time`.
    pub uptime: i64,
}

/// `POST /api/update-config` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigRequest {
    #[serde(default)]
    pub room_id: String,

    #[serde(default = "empty_secret")]
    pub cookie: SecretString,
}

/// `POST /api/update-cookie` body.
#[derive(Debug, Deserialize)]
pub struct UpdateCookieRequest {
    #[serde(default = "empty_secret")]
    pub cookie: SecretString,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

/// Successful config update response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfigResponse {
    pub success: bool,
    pub message: String,
    pub data: SessionSnapshot,
}

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests.
    pub status: String,

    /// Time the probe was answered.
    pub timestamp: DateTime<Utc>,
}
