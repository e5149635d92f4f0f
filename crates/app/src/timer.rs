//! Signal timer — the background loop that keeps clusters cycling.
//!
//! Once spawned the loop wires itself to the registry's clusters, primes the
//! first cycle and then only ticks; every later state change is driven by
//! cluster updates, which run inline on the watchdog task that raised them.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use trafficsync_domain::id::SubscriptionId;
use trafficsync_domain::light::LightState;

use crate::cluster::{Cluster, ClusterUpdate, PolarCluster, TetheredCluster};
use crate::registry::Registry;

/// How often the loop wakes up when nothing else is configured.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);

/// Settings for a [`SignalTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub tick_interval: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Extension points of the loop. Both run on the caller's side of the
/// corresponding event and must not block.
pub trait TimerHooks: Send + Sync + 'static {
    /// Called once per tick, before the loop waits again.
    fn on_tick(&self) {}

    /// Called by [`SignalTimer::stop`] after the loop was told to stop and
    /// before it is joined.
    fn on_stop(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl TimerHooks for NoopHooks {}

/// Misuse of the timer lifecycle, or a loop that died.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("timer is not initialized")]
    NotInitialized,
    #[error("timer is already running")]
    AlreadyRunning,
    #[error("no tokio runtime to run the timer on")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error("timer loop failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Lifecycle: stopped → [`init`](Self::init) → [`spawn`](Self::spawn) →
/// [`stop`](Self::stop) → stopped.
pub struct SignalTimer<H = NoopHooks> {
    settings: TimerSettings,
    hooks: Arc<H>,
    registry: Option<Arc<Registry>>,
    running: Option<RunningLoop>,
}

impl SignalTimer<NoopHooks> {
    #[must_use]
    pub fn new(settings: TimerSettings) -> Self {
        Self::with_hooks(settings, NoopHooks)
    }
}

impl<H: TimerHooks> SignalTimer<H> {
    #[must_use]
    pub fn with_hooks(settings: TimerSettings, hooks: H) -> Self {
        Self {
            settings,
            hooks: Arc::new(hooks),
            registry: None,
            running: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> TimerSettings {
        self.settings
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.registry.is_some()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Attach the registry the next loop will drive.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::AlreadyRunning`] while a loop is running.
    pub fn init(&mut self, registry: Arc<Registry>) -> Result<(), TimerError> {
        if self.is_running() {
            return Err(TimerError::AlreadyRunning);
        }
        self.registry = Some(registry);
        Ok(())
    }

    /// Start the loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NotInitialized`] before [`init`](Self::init),
    /// [`TimerError::AlreadyRunning`] if a loop is running and
    /// [`TimerError::NoRuntime`] outside a tokio runtime.
    pub fn spawn(&mut self) -> Result<(), TimerError> {
        let Some(registry) = self.registry.clone() else {
            return Err(TimerError::NotInitialized);
        };
        if self.is_running() {
            return Err(TimerError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current()?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(run(
            registry,
            self.settings,
            Arc::clone(&self.hooks),
            stop_rx,
        ));
        self.running = Some(RunningLoop { stop_tx, handle });
        Ok(())
    }

    /// Stop the loop, if any, wait for it to finish and detach the registry.
    ///
    /// The loop notices the request immediately, even mid-wait. Watchdogs
    /// already armed on lights keep running.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NotInitialized`] before [`init`](Self::init) and
    /// [`TimerError::Join`] if the loop panicked.
    pub async fn stop(&mut self) -> Result<(), TimerError> {
        if !self.is_initialized() {
            return Err(TimerError::NotInitialized);
        }
        let running = self.running.take();
        if let Some(running) = &running {
            running.stop_tx.send_replace(true);
        }
        self.hooks.on_stop();
        let joined = match running {
            Some(running) => running.handle.await,
            None => Ok(()),
        };
        self.registry = None;
        tracing::info!("signal timer detached");
        Ok(joined?)
    }
}

impl<H> std::fmt::Debug for SignalTimer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalTimer")
            .field("settings", &self.settings)
            .field("initialized", &self.registry.is_some())
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

async fn run<H: TimerHooks>(
    registry: Arc<Registry>,
    settings: TimerSettings,
    hooks: Arc<H>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let wiring = Wiring::attach(&registry);
    start_cycle(&registry);
    tracing::info!(
        tethered = wiring.tethered.len(),
        polar = wiring.polar.len(),
        tick = ?settings.tick_interval,
        "signal timer started"
    );

    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }
        hooks.on_tick();
        tokio::select! {
            () = tokio::time::sleep(settings.tick_interval) => {}
            _ = stop_rx.changed() => break,
        }
    }

    wiring.detach();
    tracing::info!("signal timer stopped");
}

/// Drive every tether to `Go` (and its paired polar cluster to the opposite)
/// and every unpaired polar cluster to `Go`.
fn start_cycle(registry: &Registry) {
    for cluster in registry.tethered_clusters() {
        cluster.set_master_state_to(LightState::Go);
        if let Some(polar) = paired_polar(registry, &cluster) {
            polar.set_master_state_to(LightState::Go.polar());
        }
    }
    for cluster in registry.unpaired_polar_clusters() {
        cluster.set_master_state_to(LightState::Go);
    }
}

fn paired_polar(registry: &Registry, tether: &TetheredCluster) -> Option<Arc<PolarCluster>> {
    let master = tether.master()?;
    registry.cluster_for(master.id()).polar
}

fn on_tethered_update(registry: &Registry, update: &ClusterUpdate<TetheredCluster>) {
    let expired = update.master_state;
    tracing::debug!(cluster = %update.cluster, %expired, "cycling tethered cluster");
    update.cluster.set_master_state_to(expired.polar());
    if let Some(polar) = paired_polar(registry, &update.cluster) {
        polar.set_master_state_to(expired);
    }
}

fn on_polar_update(update: &ClusterUpdate<PolarCluster>) {
    let expired = update.master_state;
    tracing::debug!(cluster = %update.cluster, %expired, "cycling polar cluster");
    update.cluster.set_master_state_to(expired.polar());
}

/// The update handlers one loop installed, removed again when it exits.
struct Wiring {
    tethered: Vec<(Arc<TetheredCluster>, SubscriptionId)>,
    polar: Vec<(Arc<PolarCluster>, SubscriptionId)>,
}

impl Wiring {
    fn attach(registry: &Arc<Registry>) -> Self {
        let tethered = registry
            .tethered_clusters()
            .into_iter()
            .map(|cluster| {
                let registry: Weak<Registry> = Arc::downgrade(registry);
                let subscription = cluster.subscribe_updates(move |update| {
                    if let Some(registry) = registry.upgrade() {
                        on_tethered_update(&registry, update);
                    }
                });
                (cluster, subscription)
            })
            .collect();
        let polar = registry
            .unpaired_polar_clusters()
            .into_iter()
            .map(|cluster| {
                let subscription = cluster.subscribe_updates(on_polar_update);
                (cluster, subscription)
            })
            .collect();
        Self { tethered, polar }
    }

    fn detach(self) {
        for (cluster, subscription) in self.tethered {
            cluster.unsubscribe_updates(subscription);
        }
        for (cluster, subscription) in self.polar {
            cluster.unsubscribe_updates(subscription);
        }
    }
}
