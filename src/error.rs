use std::collections::TryReserveError;

use thiserror::Error;

use crate::timer::TimerHandle;

/// Rejected [`MapConfig`](crate::MapConfig) values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("initial capacity must be at least 1")]
    ZeroCapacity,

    #[error("load factor must be a positive finite number, got {0}")]
    InvalidLoadFactor(f32),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid map configuration: {0}")]
    Config(#[from] ConfigError),

    /// Growing would overflow the bucket count.
    #[error("bucket table cannot grow beyond {capacity} buckets")]
    CapacityOverflow { capacity: usize },

    /// The grown bucket array could not be allocated. The table is unchanged.
    #[error("failed to allocate {buckets} buckets while growing the table")]
    Allocation {
        buckets: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("failed to schedule the expiration sweep: {0}")]
    Timer(#[from] TimerError),
}

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer period must be greater than zero")]
    ZeroPeriod,

    /// `now + initial_delay` cannot be represented as an `Instant`.
    #[error("timer initial delay {0:?} is too large")]
    DelayTooLarge(std::time::Duration),

    /// The handle was never issued or has already been unregistered.
    #[error("timer {0:?} is not registered")]
    UnknownHandle(TimerHandle),

    #[error("failed to start the timer driver thread")]
    Spawn(#[source] std::io::Error),

    #[error("timer driver thread is no longer running")]
    DriverGone,
}
