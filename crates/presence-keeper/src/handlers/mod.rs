//! HTTP request handlers for Presence Keeper.

pub mod health;
pub mod metrics;
pub mod session;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use session::{get_status, update_config, update_cookie};
