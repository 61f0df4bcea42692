use std::time::{Duration, Instant};

use tracing::{trace, warn};

pub use parking_lot::{Condvar, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

/// How long an acquisition may wait before a warning is logged.
/// Acquisition keeps waiting after the warning.
const CONTENTION_WARNING: Duration = Duration::from_secs(5);

/// An exclusive lock with a name used in diagnostics.
///
/// The guard returned by [`Mutex::lock`] releases the lock when it goes out of
/// scope, including during unwinding.
///
/// # Examples
///
/// ```
/// use lapse::lock::Mutex;
///
/// let counter = Mutex::new("counter", 0);
/// *counter.lock() += 1;
/// assert_eq!(*counter.lock(), 1);
/// ```
pub struct Mutex<T> {
    name: &'static str,
    inner: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: parking_lot::Mutex::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, blocking the current thread until it is available.
    ///
    /// The lock is not reentrant: locking it twice from the same thread deadlocks.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        if let Some(guard) = self.inner.try_lock() {
            return guard;
        }

        trace!(lock = self.name, "contended mutex");
        let started = Instant::now();
        loop {
            match self.inner.try_lock_for(CONTENTION_WARNING) {
                Some(guard) => return guard,
                None => warn!(
                    lock = self.name,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "mutex acquisition is taking longer than expected"
                ),
            }
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }
}

/// A shared/exclusive lock with a name used in diagnostics.
///
/// Any number of readers may hold the lock at once, or exactly one writer.
/// A thread must not request a second mode on a lock it already holds: taking
/// `read()` twice may deadlock once a writer is queued, and `write()` while
/// holding `read()` always does.
pub struct RwLock<T> {
    name: &'static str,
    inner: parking_lot::RwLock<T>,
}

impl<T> RwLock<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: parking_lot::RwLock::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        if let Some(guard) = self.inner.try_read() {
            return guard;
        }

        let started = Instant::now();
        loop {
            match self.inner.try_read_for(CONTENTION_WARNING) {
                Some(guard) => return guard,
                None => warn!(
                    lock = self.name,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "read lock acquisition is taking longer than expected"
                ),
            }
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        if let Some(guard) = self.inner.try_write() {
            return guard;
        }

        trace!(lock = self.name, "contended write lock");
        let started = Instant::now();
        loop {
            match self.inner.try_write_for(CONTENTION_WARNING) {
                Some(guard) => return guard,
                None => warn!(
                    lock = self.name,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "write lock acquisition is taking longer than expected"
                ),
            }
        }
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.inner.try_read()
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.inner.try_write()
    }
}
