//! JSONP response bodies in the upstream platform's format.
//!
//! Used with `wiremock` to stand in for the chat platform.

use serde_json::{json, Value};

/// Callback name used by every fixture.
pub const TEST_CALLBACK: &str = "jQuery11240123456789012345_1700000000000";

/// Wrap `payload` the way the platform does: `<callback>(<json>)`.
pub fn jsonp(payload: &Value) -> String {
    format!("{TEST_CALLBACK}({payload})")
}

/// Successful identity lookup for `uid` / `nickname`.
pub fn identity_body(uid: &str, nickname: &str) -> String {
    jsonp(&json!({
        "error": 0,
        "msg": "",
        "data": [{ "uid": uid, "nickname": nickname }]
    }))
}

/// Envelope with no payload beyond the status code.
pub fn envelope_body(code: i64, message: &str) -> String {
    jsonp(&json!({ "error": code, "msg": message }))
}

/// Successful envelope with an empty `data` object.
pub fn ok_body() -> String {
    envelope_body(0, "")
}

/// Token issuance response, as consumed by the `join` step.
pub fn token_body(token: &str) -> String {
    jsonp(&json!({ "error": 0, "data": { "token": token } }))
}

/// Rejection the platform returns for an expired cookie.
pub fn not_logged_in_body() -> String {
    envelope_body(401, "not logged in")
}
