use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type TimestampMillis = i64;

/// Source of the current time for entry timestamps.
///
/// Implementations should be monotonically non-decreasing for practical
/// purposes; expiry compares differences between two readings.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> TimestampMillis;
}

/// Reads the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_millis(&self) -> TimestampMillis {
        now_millis()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// A clock set before the epoch reads as `0`.
pub fn now_millis() -> TimestampMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMillis)
        .unwrap_or_default()
}

/// A clock that only moves when told to.
///
/// # Examples
///
/// ```
/// use lapse::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now_millis(), 1_250);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: TimestampMillis) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: TimestampMillis) {
        self.now.store(now, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        self.now
            .fetch_add(by.as_millis() as TimestampMillis, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_millis(&self) -> TimestampMillis {
        self.now.load(Ordering::Acquire)
    }
}
