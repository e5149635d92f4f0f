//! Light — the state vocabulary and timing rules of a single signal.
//!
//! The runtime light (with its subscribers and fail-safe watchdog) lives in
//! the `app` crate; this module only holds the pure pieces it is built from.

mod configuration;
mod state;

pub use configuration::{Configuration, StateDuration};
pub use state::LightState;
