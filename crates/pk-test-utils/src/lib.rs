//! # PK Test Utilities
//!
//! Shared test utilities for the Presence Keeper service.
//!
//! This crate provides:
//! - Server test harness (`TestPkServer`, the real router on an ephemeral port)
//! - JSONP response bodies for mocking the upstream platform (`fixtures`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pk_test_utils::*;
//! use presence_keeper::services::upstream::mock::MockPresenceAdapter;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestPkServer::spawn(Arc::new(MockPresenceAdapter::succeeding())).await?;
//!
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

pub use server_harness::*;
