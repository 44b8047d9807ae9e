//! Shared domain types for the order watcher.
//!
//! Every other crate in the workspace speaks in these types: signed orders and
//! their decoded asset data, raw chain logs and block headers, the computed
//! state of a watched order, and the clock abstraction used by the pollers.

pub mod asset;
pub mod common;
pub mod events;
pub mod order;
pub mod state;
pub mod time;

pub use asset::*;
pub use common::*;
pub use events::*;
pub use order::*;
pub use state::*;
pub use time::*;
