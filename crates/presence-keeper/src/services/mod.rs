//! Service layer for Presence Keeper.
//!
//! - `session_controller` - the session and its lifecycle
//! - `upstream` - calls to the chat platform
//! - `bootstrap` - the join sequence as data

pub mod bootstrap;
pub mod session_controller;
pub mod upstream;

pub use session_controller::{ControllerSettings, SessionController, TickOutcome};
pub use upstream::{HttpPresenceAdapter, PresenceAdapter};
