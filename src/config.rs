use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Construction parameters of an [`ExpiringMap`](crate::ExpiringMap).
///
/// # Example
///
/// ```
/// use lapse::MapConfig;
/// use std::time::Duration;
///
/// let config = MapConfig::default()
///     .with_capacity(16)
///     .with_sweep_period(Duration::from_secs(30));
/// assert_eq!(config.threshold(), 12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    /// Initial number of buckets (default: 100).
    pub capacity: usize,
    /// Fraction of `capacity` at which the table grows (default: 0.75).
    pub load_factor: f32,
    /// Age after which an untouched entry counts as expired, and the interval
    /// of the background sweep. Zero disables both (default).
    pub sweep_period: Duration,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            sweep_period: Duration::ZERO,
        }
    }
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_load_factor(mut self, load_factor: f32) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Sets the sweep period.
    ///
    /// Entries are reported once `now - last_touched` exceeds this period, and
    /// the sweep runs every period, first one period after construction.
    /// Expiry ages are compared in whole milliseconds; a sub-millisecond
    /// remainder rounds the age up to the next millisecond.
    pub fn with_sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = period;
        self
    }

    /// Number of entries at which a table of this capacity grows.
    #[inline]
    pub fn threshold(&self) -> usize {
        threshold(self.capacity, self.load_factor)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        if !self.load_factor.is_finite() || self.load_factor <= 0.0 {
            return Err(ConfigError::InvalidLoadFactor(self.load_factor));
        }

        Ok(())
    }
}

#[inline]
pub(crate) fn threshold(capacity: usize, load_factor: f32) -> usize {
    (capacity as f64 * load_factor as f64) as usize
}
