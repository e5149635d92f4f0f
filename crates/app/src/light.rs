//! Light — a single signal with a time-bounded fail-safe watchdog.
//!
//! Every state assignment recomputes the expiration, notifies state-changed
//! subscribers inline and, for any state other than
//! [`LightState::StopThenGo`], arms a watchdog task. The watchdog sleeps until
//! the expiration, emits a state-expired notification, waits
//! [`FAIL_SAFE_GRACE`] more and then forces the safe state. A watchdog only
//! acts while the light is still on the assignment that armed it: each
//! assignment bumps a generation counter and stale watchdogs exit silently.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::time::Instant;
use trafficsync_domain::event::{LightStateChanged, LightStateExpired};
use trafficsync_domain::id::{LightId, SubscriptionId};
use trafficsync_domain::light::{Configuration, LightState};
use trafficsync_domain::time::{self, Timestamp};

use crate::event_bus::Subscribers;

/// Extra time a light may stay in an expired state before reverting to safe.
pub const FAIL_SAFE_GRACE: Duration = Duration::from_secs(5);

const DEFAULT_NAME: &str = "No Name";

#[derive(Debug, Default)]
struct Status {
    state: LightState,
    expiration: Option<Timestamp>,
    generation: u64,
}

/// A single signal light.
///
/// Lights are always handled through an [`Arc`] so clusters, the registry
/// and the watchdog can share them.
pub struct Light {
    id: LightId,
    name: String,
    me: Weak<Light>,
    status: Mutex<Status>,
    configuration: RwLock<Arc<Configuration>>,
    state_changed: Subscribers<LightStateChanged>,
    state_expired: Subscribers<LightStateExpired>,
}

impl Light {
    /// Create a builder for constructing a [`Light`].
    #[must_use]
    pub fn builder() -> LightBuilder {
        LightBuilder::default()
    }

    #[must_use]
    pub fn id(&self) -> LightId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> LightState {
        self.lock_status().state
    }

    /// When the current state expires, `None` if it never does.
    #[must_use]
    pub fn state_expiration(&self) -> Option<Timestamp> {
        self.lock_status().expiration
    }

    #[must_use]
    pub fn configuration(&self) -> Arc<Configuration> {
        Arc::clone(
            &self
                .configuration
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Replace the configuration. Takes effect on the next state assignment.
    pub fn set_configuration(&self, configuration: Arc<Configuration>) {
        *self
            .configuration
            .write()
            .unwrap_or_else(PoisonError::into_inner) = configuration;
    }

    /// Assign a state, even if it equals the current one.
    ///
    /// State-changed subscribers run before this returns. Outside a tokio
    /// runtime the assignment still happens but no watchdog can be armed.
    pub fn set_state(&self, state: LightState) {
        self.assign(state, None);
    }

    pub fn subscribe_state_changed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LightStateChanged) + Send + Sync + 'static,
    {
        self.state_changed.subscribe(handler)
    }

    pub fn subscribe_state_expired<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LightStateExpired) + Send + Sync + 'static,
    {
        self.state_expired.subscribe(handler)
    }

    /// Remove a state-changed or state-expired handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state_changed.unsubscribe(id) || self.state_expired.unsubscribe(id)
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `state` and fan it out. With `expected` set, the assignment only
    /// happens if the light is still on that generation.
    fn assign(&self, state: LightState, expected: Option<u64>) -> bool {
        let configuration = self.configuration();
        let (generation, deadline) = {
            let mut status = self.lock_status();
            if expected.is_some_and(|generation| generation != status.generation) {
                return false;
            }
            status.state = state;
            status.expiration = configuration.calculate_expiration(state, time::now());
            status.generation = status.generation.wrapping_add(1);
            let deadline = configuration
                .duration_of(state)
                .as_duration()
                .and_then(|span| Instant::now().checked_add(span));
            (status.generation, deadline)
        };

        tracing::debug!(light_id = %self.id, name = %self.name, %state, "light state assigned");
        self.state_changed.publish(&LightStateChanged {
            light_id: self.id,
            state,
        });

        if !state.is_safe()
            && let Some(deadline) = deadline
        {
            self.arm_watchdog(generation, deadline);
        }
        true
    }

    fn arm_watchdog(&self, generation: u64, deadline: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                light_id = %self.id,
                name = %self.name,
                "no tokio runtime, fail-safe watchdog not armed"
            );
            return;
        };
        handle.spawn(watchdog(self.me.clone(), generation, deadline));
    }

    /// The expiration notification for `generation`, if it is still current.
    fn expired_if_current(&self, generation: u64) -> Option<LightStateExpired> {
        let status = self.lock_status();
        if status.generation != generation {
            return None;
        }
        status.expiration.map(|expiration| LightStateExpired {
            light_id: self.id,
            state: status.state,
            expiration,
        })
    }
}

async fn watchdog(light: Weak<Light>, generation: u64, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;
    let Some(current) = light.upgrade() else {
        return;
    };
    if let Some(event) = current.expired_if_current(generation) {
        tracing::debug!(light_id = %event.light_id, state = %event.state, "light state expired");
        current.state_expired.publish(&event);
    }
    drop(current);

    tokio::time::sleep(FAIL_SAFE_GRACE).await;
    let Some(current) = light.upgrade() else {
        return;
    };
    if current.assign(LightState::StopThenGo, Some(generation)) {
        tracing::warn!(
            light_id = %current.id,
            name = %current.name,
            "light was not refreshed in time, reverted to safe state"
        );
    }
}

impl PartialEq for Light {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Light {}

impl std::hash::Hash for Light {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Light")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &*self.lock_status())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name: {}, State: {}, Id: {}", self.name, self.state(), self.id)
    }
}

/// Step-by-step builder for [`Light`].
#[derive(Debug, Default)]
pub struct LightBuilder {
    id: Option<LightId>,
    name: Option<String>,
    configuration: Option<Arc<Configuration>>,
}

impl LightBuilder {
    #[must_use]
    pub fn id(mut self, id: LightId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use `configuration` instead of [`Configuration::shared_default`].
    #[must_use]
    pub fn configuration(mut self, configuration: Arc<Configuration>) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Consume the builder and return a light in the safe state.
    #[must_use]
    pub fn build(self) -> Arc<Light> {
        Arc::new_cyclic(|me: &Weak<Light>| Light {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            me: me.clone(),
            status: Mutex::new(Status::default()),
            configuration: RwLock::new(
                self.configuration
                    .unwrap_or_else(Configuration::shared_default),
            ),
            state_changed: Subscribers::new(),
            state_expired: Subscribers::new(),
        })
    }
}
