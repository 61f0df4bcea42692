//! Lapse is a small toolkit of concurrent in-memory containers built around
//! an expiring hash map.
//!
//! - [`ExpiringMap`] : A thread-safe hash map that timestamps every write and
//!   periodically reports entries that have not been written for longer than
//!   a configured period.
//! - [`TimerService`] : A process-wide service running periodic callbacks on a
//!   single driver thread. Expiring maps schedule their sweeps with it.
//! - [`BoundedQueue`] : A fixed-capacity blocking FIFO for any number of
//!   producers and consumers.
//! - [`lock`] : Named mutex and read-write lock wrappers that log slow
//!   acquisitions.
//!
//! Expiry is notification only. The map never drops an entry on its own; the
//! expiration callback decides what to do, typically by handing the key to a
//! worker that calls [`ExpiringMap::remove`].
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use lapse::{BoundedQueue, ExpiringMap};
//!
//! let evictions = Arc::new(BoundedQueue::new(64));
//!
//! let sink = evictions.clone();
//! let sessions = ExpiringMap::<String, u64>::builder()
//!     .sweep_period(Duration::from_secs(30))
//!     .on_expired(move |key| {
//!         let _ = sink.try_push(key.clone());
//!     })
//!     .build()
//!     .unwrap();
//!
//! sessions.put("alice".to_string(), 1).unwrap();
//! assert_eq!(sessions.get("alice"), Some(1));
//!
//! // a worker would drain `evictions` and call `sessions.remove(&key)`.
//! while let Some(key) = evictions.try_pop() {
//!     sessions.remove(&key);
//! }
//! ```

// for internal use.
pub(crate) mod entry;
pub(crate) mod hash;

// for external use.

/// Millisecond time sources used for entry timestamps.
pub mod clock;

/// Plain-data configuration for [`ExpiringMap`].
pub mod config;

mod error;

/// Named lock primitives.
pub mod lock;

/// The expiring hash map and its iterators.
pub mod map;

/// A bounded blocking queue.
pub mod queue;

/// The process-wide periodic timer service.
pub mod timer;

pub use crate::config::MapConfig;
pub use crate::error::{ConfigError, MapError, TimerError};

#[doc(inline)]
pub use crate::map::{ExpiringMap, Put};
#[doc(inline)]
pub use crate::queue::BoundedQueue;
#[doc(inline)]
pub use crate::timer::{TimerHandle, TimerService};
