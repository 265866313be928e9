//! Secret types for keeping upstream credentials out of logs.
//!
//! Re-exports [`secrecy`] types. The session cookie an operator submits is
//! the only credential this workspace handles, and it is held as a
//! [`SecretString`] from the moment it is deserialized until it is written
//! into an outbound `Cookie` header.
//!
//! `SecretString` implements `Debug` with redaction, so deriving `Debug` on a
//! request or state struct that holds one is safe for `{:?}` and `tracing`.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct Credential {
//!     room_id: String,
//!     cookie: SecretString,
//! }
//!
//! let cred = Credential {
//!     room_id: "25293".to_string(),
//!     cookie: SecretString::from("sid=abc; token=xyz"),
//! };
//!
//! // Room ID is visible, cookie is redacted.
//! println!("{:?}", cred);
//!
//! let header: &str = cred.cookie.expose_secret();
//! assert!(header.starts_with("sid="));
//! ```

pub use secrecy::{ExposeSecret, SecretString};
