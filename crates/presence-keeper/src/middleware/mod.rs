//! HTTP middleware for Presence Keeper.
//!
//! - `http_metrics` - request metrics for every response
//! - `request_timeout` - 30 second bound with a JSON error body

pub mod http_metrics;
pub mod request_timeout;

pub use http_metrics::http_metrics_middleware;
pub use request_timeout::request_timeout_middleware;
