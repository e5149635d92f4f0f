//! # trafficsyncd — traffic light synchronisation daemon
//!
//! Composition root that turns a configuration file into running lights.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Build the configured lights and clusters and register them
//! - Run the controller until shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no signalling logic belongs here.

pub mod config;
pub mod layout;
