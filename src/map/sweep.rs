use crate::clock::TimestampMillis;
use crate::entry::Entry;
use crate::map::table::{Cursor, Table};
use crate::map::Shared;

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

/// Called once per expired key on every sweep tick.
pub type ExpiredCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Expiry settings of a map: how old an entry may get, and who to tell.
pub(crate) struct Sweep<K> {
    period: Duration,
    period_ms: i64,
    callback: Option<ExpiredCallback<K>>,
}

impl<K> Sweep<K> {
    pub fn new(period: Duration, callback: Option<ExpiredCallback<K>>) -> Self {
        Self {
            period,
            period_ms: period_millis(period),
            callback,
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        !self.period.is_zero()
    }

    #[inline]
    pub fn is_expired<V>(&self, entry: &Entry<K, V>, as_of: TimestampMillis) -> bool {
        self.is_enabled() && entry.is_expired(as_of, self.period_ms)
    }
}

/// `period` in whole milliseconds, rounded up so a sub-millisecond remainder
/// never shortens the expiry age.
fn period_millis(period: Duration) -> i64 {
    let mut ms = period.as_millis();
    if period.subsec_nanos() % 1_000_000 != 0 {
        ms += 1;
    }
    ms.min(i64::MAX as u128) as i64
}

impl<K, V, H> Shared<K, V, H>
where
    K: Clone,
{
    /// One tick of the background sweep.
    ///
    /// Walks the expired entries as of now and reports each key to the
    /// callback. The table lock is only held while stepping, never while the
    /// callback runs, and no entry is removed.
    pub(crate) fn sweep(&self) {
        let callback = match self.sweep.callback.as_ref() {
            Some(callback) => callback,
            None => return,
        };

        let as_of = self.clock.now_millis();
        let mut cursor = Cursor::default();
        let mut notified = 0usize;

        loop {
            let key = {
                let guard = self.table.read();
                let table: &Table<K, V> = &guard;
                cursor
                    .advance(table, |e| self.sweep.is_expired(e, as_of))
                    .and_then(|key| table.entry(key))
                    .map(|entry| entry.key.clone())
            };

            match key {
                Some(key) => {
                    callback(&key);
                    notified += 1;
                }
                None => break,
            }
        }

        trace!(as_of, notified, "expiration sweep finished");
    }
}
