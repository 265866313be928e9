//! JSONP envelope codec.
//!
//! The upstream chat platform answers browser-style script requests with a
//! body of the form `<callback>(<json>)`, optionally followed by `;`. The
//! inner JSON is an envelope carrying an integer `error` code (0 on
//! success), an optional `msg`/`message` and a `data` payload.
//!
//! # Example
//!
//! ```rust
//! use common::jsonp::{parse_jsonp, Envelope};
//!
//! let body = r#"jQuery123_456({"error":0,"data":[{"uid":"1","nickname":"A"}]})"#;
//! let value = parse_jsonp(body).unwrap();
//! let envelope = Envelope::from_value(&value);
//! assert!(envelope.is_success());
//! ```

use rand::Rng;
use serde_json::Value;
use thiserror::Error;

/// Errors produced while decoding a JSONP body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JsonpError {
    /// Body does not contain a `(...)` call wrapper.
    #[error("response is not JSONP-wrapped")]
    MissingWrapper,

    /// Wrapper found, but the text inside is not valid JSON.
    #[error("invalid JSON inside JSONP wrapper: {0}")]
    InvalidJson(String),
}

/// Returns the text between the first `(` and the last `)` of `body`.
///
/// # Errors
///
/// Returns [`JsonpError::MissingWrapper`] if either parenthesis is absent
/// or the closing one precedes the opening one.
pub fn unwrap_jsonp(body: &str) -> Result<&str, JsonpError> {
    let open = body.find('(').ok_or(JsonpError::MissingWrapper)?;
    let close = body.rfind(')').ok_or(JsonpError::MissingWrapper)?;
    if close <= open {
        return Err(JsonpError::MissingWrapper);
    }
    body.get(open + 1..close).ok_or(JsonpError::MissingWrapper)
}

/// Unwraps a JSONP body and parses the inner JSON.
///
/// # Errors
///
/// Returns [`JsonpError::MissingWrapper`] or [`JsonpError::InvalidJson`].
pub fn parse_jsonp(body: &str) -> Result<Value, JsonpError> {
    let inner = unwrap_jsonp(body)?;
    serde_json::from_str(inner.trim()).map_err(|e| JsonpError::InvalidJson(e.to_string()))
}

/// Application-level status read from a decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Upstream error code; 0 means success. Missing codes read as 0.
    pub code: i64,
    /// Upstream message, if any.
    pub message: Option<String>,
}

impl Envelope {
    /// Reads `error` and `msg`/`message` from a decoded payload.
    ///
    /// String codes such as `"0"` are accepted; anything unparseable is
    /// treated as a failure code of -1.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let code = match value.get("error") {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(-1),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(-1),
            Some(Value::Bool(b)) => i64::from(*b),
            Some(_) => -1,
        };

        let message = value
            .get("msg")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Self { code, message }
    }

    /// Whether the envelope reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Builds a jQuery-style callback name: `jQuery<random digits>_<now_ms>`.
#[must_use]
pub fn callback_name(now_ms: i64) -> String {
    let digits: u64 = rand::thread_rng().gen_range(10_000_000_000_000_000..100_000_000_000_000_000);
    format!("jQuery{digits}_{now_ms}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reference_body() {
        let body = r#"jQuery123_456({"error":0,"data":[{"uid":"1","nickname":"A"}]})"#;

        let value = parse_jsonp(body).unwrap();

        assert_eq!(
            value,
            json!({"error": 0, "data": [{"uid": "1", "nickname": "A"}]})
        );
    }

    #[test]
    fn test_parse_without_parentheses_fails() {
        let result = parse_jsonp(r#"{"error":0,"data":[]}"#);
        assert_eq!(result, Err(JsonpError::MissingWrapper));
    }

    #[test]
    fn test_parse_with_reversed_parentheses_fails() {
        let result = parse_jsonp("cb)({}(");
        assert_eq!(result, Err(JsonpError::MissingWrapper));
    }

    #[test]
    fn test_parse_tolerates_trailing_semicolon_and_whitespace() {
        let body = "jQuery1_2( {\"error\":0} );\n";
        let value = parse_jsonp(body).unwrap();
        assert_eq!(value, json!({"error": 0}));
    }

    #[test]
    fn test_parse_keeps_parentheses_inside_payload() {
        let body = r#"cb({"error":0,"msg":"ok (cached)"})"#;
        let value = parse_jsonp(body).unwrap();
        assert_eq!(value["msg"], "ok (cached)");
    }

    #[test]
    fn test_parse_invalid_inner_json() {
        let result = parse_jsonp("cb({not json})");
        assert!(matches!(result, Err(JsonpError::InvalidJson(_))));
    }

    #[test]
    fn test_envelope_success_and_failure() {
        let ok = Envelope::from_value(&json!({"error": 0, "data": {}}));
        assert!(ok.is_success());
        assert_eq!(ok.message, None);

        let failed = Envelope::from_value(&json!({"error": 401, "msg": "not logged in"}));
        assert!(!failed.is_success());
        assert_eq!(failed.code, 401);
        assert_eq!(failed.message.as_deref(), Some("not logged in"));
    }

    #[test]
    fn test_envelope_missing_error_is_success() {
        let envelope = Envelope::from_value(&json!({"data": []}));
        assert!(envelope.is_success());
    }

    #[test]
    fn test_envelope_string_code_and_message_alias() {
        let envelope = Envelope::from_value(&json!({"error": "3", "message": "room closed"}));
        assert_eq!(envelope.code, 3);
        assert_eq!(envelope.message.as_deref(), Some("room closed"));

        let garbage = Envelope::from_value(&json!({"error": "boom"}));
        assert_eq!(garbage.code, -1);
    }

    #[test]
    fn test_callback_name_shape() {
        let name = callback_name(1_700_000_000_000);

        assert!(name.starts_with("jQuery"));
        assert!(name.ends_with("_1700000000000"));
        let digits = name
            .trim_start_matches("jQuery")
            .split('_')
            .next()
            .unwrap();
        assert_eq!(digits.len(), 17);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }
}
