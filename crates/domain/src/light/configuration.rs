//! Configuration — how long a light may hold each state.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::LightState;
use crate::time::Timestamp;

/// How long a state lasts before it expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateDuration {
    /// Expires after the given span.
    Bounded(Duration),
    /// Never expires.
    Unbounded,
}

impl StateDuration {
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self::Bounded(Duration::from_secs(secs))
    }

    /// The span, or `None` when unbounded.
    #[must_use]
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Bounded(duration) => Some(duration),
            Self::Unbounded => None,
        }
    }
}

/// Mapping of state to duration.
///
/// A configuration is shared between every light it is assigned to, so an
/// [`add`](Self::add) is seen by all of them on their next state assignment.
#[derive(Debug)]
pub struct Configuration {
    durations: RwLock<HashMap<LightState, StateDuration>>,
}

impl Default for Configuration {
    fn default() -> Self {
        let durations = HashMap::from([
            (LightState::Go, StateDuration::from_secs(60)),
            (LightState::Stop, StateDuration::from_secs(60)),
            (LightState::Transitioning, StateDuration::from_secs(5)),
            (LightState::StopThenGo, StateDuration::Unbounded),
        ]);
        Self {
            durations: RwLock::new(durations),
        }
    }
}

impl Configuration {
    /// A configuration holding the default durations
    /// (`Go` 60s, `Stop` 60s, `Transitioning` 5s, `StopThenGo` unbounded).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default configuration, built on first use.
    #[must_use]
    pub fn shared_default() -> Arc<Self> {
        static DEFAULT: OnceLock<Arc<Configuration>> = OnceLock::new();
        Arc::clone(DEFAULT.get_or_init(|| Arc::new(Self::default())))
    }

    /// Insert or replace the duration of `state`.
    pub fn add(&self, state: LightState, duration: StateDuration) -> &Self {
        self.durations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state, duration);
        self
    }

    /// Configured duration of `state`; unknown states never expire.
    #[must_use]
    pub fn duration_of(&self, state: LightState) -> StateDuration {
        self.durations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&state)
            .copied()
            .unwrap_or(StateDuration::Unbounded)
    }

    /// Instant at which `state`, entered at `now`, expires.
    ///
    /// Returns `None` for unbounded states and for spans too large to represent.
    #[must_use]
    pub fn calculate_expiration(&self, state: LightState, now: Timestamp) -> Option<Timestamp> {
        let span = self.duration_of(state).as_duration()?;
        let span = chrono::Duration::from_std(span).ok()?;
        now.checked_add_signed(span)
    }
}
