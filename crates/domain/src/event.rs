//! Notifications emitted by a light.
//!
//! Both payloads are delivered synchronously to every subscriber, on the
//! execution context that caused them.

use serde::{Deserialize, Serialize};

use crate::id::LightId;
use crate::light::LightState;
use crate::time::Timestamp;

/// A light was assigned a state (possibly the one it already had).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightStateChanged {
    pub light_id: LightId,
    pub state: LightState,
}

/// A light reached the end of its configured duration without being refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightStateExpired {
    pub light_id: LightId,
    pub state: LightState,
    pub expiration: Timestamp,
}
