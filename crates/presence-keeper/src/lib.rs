//! Presence Keeper service library.
//!
//! Keeps one account marked online in one room of an external chat
//! platform: an operator submits a session cookie and a room ID, the service
//! verifies the cookie, runs the join sequence and then pings the platform on
//! a fixed interval, re-joining after repeated failures.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/session_controller.rs
//!                                      -> services/upstream.rs -> services/bootstrap.rs
//!                                      -> tasks/keep_alive.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Request, response and session types
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Session controller and upstream adapter
//! - `tasks` - Keep-alive loop

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod tasks;
