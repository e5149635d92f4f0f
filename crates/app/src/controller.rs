//! Controller — starts and stops the signal timer over a registry.

use std::sync::Arc;

use crate::registry::Registry;
use crate::timer::{NoopHooks, SignalTimer, TimerError, TimerHooks};

/// Runs a [`SignalTimer`] over a fixed [`Registry`].
#[derive(Debug)]
pub struct Controller<H = NoopHooks> {
    registry: Arc<Registry>,
    timer: SignalTimer<H>,
}

impl<H: TimerHooks> Controller<H> {
    #[must_use]
    pub fn new(registry: Arc<Registry>, timer: SignalTimer<H>) -> Self {
        Self { registry, timer }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Initialize the timer with the registry and start its loop.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::AlreadyRunning`] if the controller is running, or
    /// [`TimerError::NoRuntime`] outside a tokio runtime.
    pub fn start(&mut self) -> Result<(), TimerError> {
        self.timer.init(Arc::clone(&self.registry))?;
        self.timer.spawn()?;
        tracing::info!(lights = self.registry.len(), "controller started");
        Ok(())
    }

    /// Stop the loop and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NotInitialized`] if the controller was never
    /// started, or [`TimerError::Join`] if the loop panicked.
    pub async fn stop(&mut self) -> Result<(), TimerError> {
        self.timer.stop().await?;
        tracing::info!("controller stopped");
        Ok(())
    }
}
