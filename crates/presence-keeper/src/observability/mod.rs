//! Observability module for Presence Keeper.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
