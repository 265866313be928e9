//! Common utilities shared across Presence Keeper crates.

#![warn(clippy::pedantic)]

/// Module for the JSONP envelope codec used by the upstream chat platform
pub mod jsonp;

/// Module for secret types that prevent accidental logging
pub mod secret;
