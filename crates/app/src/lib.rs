//! # trafficsync-app
//!
//! Application layer — the runtime objects that keep groups of lights in step.
//!
//! ## Responsibilities
//! - [`light::Light`]: a single signal with a fail-safe watchdog that reverts it
//!   to the safe state when nothing refreshes it in time
//! - [`event_bus::Subscribers`]: synchronous, same-context notification fan-out
//! - [`cluster`]: the shared cluster contract plus its two flavours,
//!   [`cluster::TetheredCluster`] (same state) and [`cluster::PolarCluster`]
//!   (opposite state, anchored to a master light)
//! - [`registry::Registry`]: the consistency gate every cluster passes through
//! - [`timer::SignalTimer`] and [`controller::Controller`]: the background loop
//!   that wires cluster updates and drives the synchronisation cascade
//!
//! ## Concurrency
//! Notifications are delivered inline: when a watchdog fires, every cluster and
//! controller handler runs on the watchdog's own task before it moves on.
//! Expirations of two lights sharing a cluster at the same instant may
//! interleave in any order.
//!
//! ## Dependency rule
//! Depends on `trafficsync-domain` only (plus `tokio` for timers and tasks).

pub mod cluster;
pub mod controller;
pub mod event_bus;
pub mod light;
pub mod registry;
pub mod timer;
