//! A process-wide service that runs callbacks periodically.
//!
//! Every registration shares one driver thread. The thread sleeps until the
//! earliest registration is due, fires everything that is due, and goes back
//! to sleep. Callbacks run on the driver thread, one after another, so a slow
//! callback delays the others.

mod driver;
mod registry;

use crate::error::TimerError;

use driver::Command;
use registry::Registry;

use crossbeam::channel::Sender;
use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, warn};

use std::sync::Arc;
use std::time::{Duration, Instant};

slotmap::new_key_type! {
    /// Identifies one registration with a [`TimerService`].
    ///
    /// Handles are generational: once unregistered, a handle never matches a
    /// later registration.
    pub struct TimerHandle;
}

pub(crate) type TimerCallback = Arc<dyn Fn() + Send + Sync>;

static GLOBAL: Lazy<TimerService> = Lazy::new(TimerService::new);

pub struct TimerService {
    registry: Arc<Registry>,
    driver: OnceCell<Sender<Command>>,
}

impl TimerService {
    /// Returns the process-wide service, creating it on first use.
    pub fn global() -> &'static TimerService {
        &GLOBAL
    }

    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            driver: OnceCell::new(),
        }
    }

    /// Runs `callback` after `initial_delay`, then every `period`.
    ///
    /// The driver thread is started by the first registration.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::ZeroPeriod`] for a zero `period`,
    /// [`TimerError::DelayTooLarge`] when the first fire lies beyond the
    /// range of [`Instant`], and [`TimerError::Spawn`] if the driver thread
    /// could not be started. A `period` too large to add to the current fire
    /// time is accepted: the timer fires once and then stays idle.
    ///
    /// # Examples
    ///
    /// ```
    /// use lapse::TimerService;
    /// use std::time::Duration;
    ///
    /// let timers = TimerService::global();
    /// let handle = timers
    ///     .register(Duration::from_secs(60), Duration::from_secs(60), || {})
    ///     .unwrap();
    /// assert!(timers.is_registered(handle));
    ///
    /// timers.unregister(handle).unwrap();
    /// assert!(timers.unregister(handle).is_err());
    /// ```
    pub fn register<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        callback: F,
    ) -> Result<TimerHandle, TimerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(TimerError::ZeroPeriod);
        }

        let first_fire = Instant::now()
            .checked_add(initial_delay)
            .ok_or(TimerError::DelayTooLarge(initial_delay))?;

        let driver = self
            .driver
            .get_or_try_init(|| driver::spawn(self.registry.clone()))?;

        let handle = self.registry.insert(first_fire, period, Arc::new(callback));

        if driver.send(Command::Reschedule).is_err() {
            self.registry.remove(handle);
            return Err(TimerError::DriverGone);
        }

        debug!(?handle, ?initial_delay, ?period, "registered timer");
        Ok(handle)
    }

    /// Stops the timer behind `handle`.
    ///
    /// A callback already collected for dispatch may still run once after
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::UnknownHandle`] if `handle` was never issued by
    /// this service or was already unregistered.
    pub fn unregister(&self, handle: TimerHandle) -> Result<(), TimerError> {
        if !self.registry.remove(handle) {
            warn!(?handle, "unregister of unknown timer");
            return Err(TimerError::UnknownHandle(handle));
        }

        // no need to wake the driver: an early wake with nothing due is a
        // cheap no-op.
        debug!(?handle, "unregistered timer");
        Ok(())
    }

    pub fn is_registered(&self, handle: TimerHandle) -> bool {
        self.registry.contains(handle)
    }

    /// Returns the number of live registrations.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get() {
            let _ = driver.send(Command::Shutdown);
        }
    }
}
