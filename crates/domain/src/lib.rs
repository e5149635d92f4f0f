//! # trafficsync-domain
//!
//! Pure domain model for the trafficsync light coordination system.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **light states** (`StopThenGo`, `Stop`, `Go`, `Transitioning`) and
//!   their polar (opposite) mapping
//! - Define **configurations** (state → duration) and expiration arithmetic
//! - Define **notifications** emitted by lights (state changed / state expired)
//! - Define the typed errors returned by membership and registration checks
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app` or from an async runtime.
//! Everything that needs timers or shared mutable state lives in the `app` crate.

pub mod error;
pub mod event;
pub mod id;
pub mod light;
pub mod time;
