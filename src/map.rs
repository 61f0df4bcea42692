mod iter;
mod sweep;
mod table;

pub use iter::{ExpiredIter, Iter};
pub use sweep::ExpiredCallback;

use crate::clock::{Clock, SystemClock, TimestampMillis};
use crate::config::MapConfig;
use crate::error::MapError;
use crate::hash::{equivalent_key, make_hash, make_insert_hash};
use crate::lock::RwLock;
use crate::timer::{TimerHandle, TimerService};

use sweep::Sweep;
use table::Table;

use hashbrown::hash_map::DefaultHashBuilder;

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

/// Outcome of [`ExpiringMap::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Put {
    /// The key was not present; a new entry was created.
    Inserted,
    /// The key was present; its value and timestamp were replaced.
    Updated,
}

/// State shared between a map, its iterators and its sweep timer.
pub(crate) struct Shared<K, V, H> {
    table: RwLock<Table<K, V>>,
    hash_builder: H,
    clock: Arc<dyn Clock>,
    sweep: Sweep<K>,
}

/// A thread-safe hash map whose entries remember when they were last written.
///
/// All operations go through a single table-wide read-write lock: lookups
/// share it, writes take it exclusively. When built with a sweep period, the
/// map asks the global [`TimerService`] to run a sweep every period; the sweep
/// reports each entry older than the period to the expiration callback.
/// Reporting does not remove the entry. Callers that want eviction call
/// [`ExpiringMap::remove`] themselves.
///
/// # Examples
///
/// ```
/// use lapse::{ExpiringMap, Put};
///
/// let map = ExpiringMap::new();
/// assert_eq!(map.put("a", 1).unwrap(), Put::Inserted);
/// assert_eq!(map.put("a", 2).unwrap(), Put::Updated);
/// assert_eq!(map.get(&"a"), Some(2));
/// assert_eq!(map.len(), 1);
/// ```
pub struct ExpiringMap<K, V, H = DefaultHashBuilder> {
    shared: Arc<Shared<K, V, H>>,
    timer: Option<TimerHandle>,
}

impl<K, V> ExpiringMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map with the default configuration and no sweep.
    pub fn new() -> Self {
        Self::with_capacity(MapConfig::default().capacity)
    }

    /// Creates an empty map with `capacity` buckets and no sweep.
    ///
    /// A capacity of zero is treated as one.
    ///
    /// # Examples
    ///
    /// ```
    /// use lapse::ExpiringMap;
    ///
    /// let map = ExpiringMap::<u32, u32>::with_capacity(16);
    /// assert_eq!(map.capacity(), 16);
    /// assert_eq!(map.threshold(), 12);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let config = MapConfig::default();
        Self::from_parts(
            Table::new(capacity, config.load_factor),
            DefaultHashBuilder::default(),
            Arc::new(SystemClock),
            Sweep::new(Duration::ZERO, None),
        )
    }

    /// Starts configuring a map.
    ///
    /// # Examples
    ///
    /// ```
    /// use lapse::ExpiringMap;
    /// use std::time::Duration;
    ///
    /// let map = ExpiringMap::<String, u32>::builder()
    ///     .capacity(4)
    ///     .load_factor(0.75)
    ///     .sweep_period(Duration::from_secs(60))
    ///     .on_expired(|key| println!("{} expired", key))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(map.sweep_period(), Duration::from_secs(60));
    /// ```
    pub fn builder() -> Builder<K, V, DefaultHashBuilder> {
        Builder::new()
    }
}

impl<K, V> Default for ExpiringMap<K, V, DefaultHashBuilder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> ExpiringMap<K, V, H> {
    fn from_parts(
        table: Table<K, V>,
        hash_builder: H,
        clock: Arc<dyn Clock>,
        sweep: Sweep<K>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: RwLock::new("expiring_map.table", table),
                hash_builder,
                clock,
                sweep,
            }),
            timer: None,
        }
    }

    /// Removes every entry. Capacity is kept.
    pub fn clear(&self) {
        self.shared.table.write().clear();
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.shared.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current number of buckets.
    pub fn capacity(&self) -> usize {
        self.shared.table.read().capacity()
    }

    /// Returns the entry count at which the table grows next.
    pub fn threshold(&self) -> usize {
        self.shared.table.read().threshold()
    }

    /// Returns the sweep period, `Duration::ZERO` when expiry is disabled.
    pub fn sweep_period(&self) -> Duration {
        self.shared.sweep.period()
    }

    /// Returns the map's current time reading.
    pub fn now(&self) -> TimestampMillis {
        self.shared.clock.now_millis()
    }

    /// A weakly consistent walk over cloned `(K, V)` pairs.
    ///
    /// See [`Iter`] for what concurrent writers may do to the walk.
    ///
    /// # Examples
    ///
    /// ```
    /// use lapse::ExpiringMap;
    ///
    /// let map = ExpiringMap::new();
    /// map.put(1, "a").unwrap();
    /// map.put(2, "b").unwrap();
    ///
    /// let mut pairs: Vec<_> = map.keys().collect();
    /// pairs.sort();
    /// assert_eq!(pairs, vec![(1, "a"), (2, "b")]);
    /// ```
    pub fn keys(&self) -> Iter<'_, K, V, H> {
        Iter::new(&*self.shared)
    }

    /// A weakly consistent walk over the entries whose age as of `as_of`
    /// exceeds the sweep period.
    pub fn expired_keys(&self, as_of: TimestampMillis) -> ExpiredIter<'_, K, V, H> {
        ExpiredIter::new(&*self.shared, as_of)
    }
}

impl<K, V, H> ExpiringMap<K, V, H>
where
    K: Hash + Eq,
    H: BuildHasher,
{
    /// Inserts `value` under `key`, or replaces the value of an existing key.
    /// Either way the entry's timestamp is set to now.
    ///
    /// Reaching the growth threshold quadruples the bucket count before the
    /// write lock is released.
    ///
    /// # Errors
    ///
    /// Fails if the grown bucket array cannot be allocated. The map is then
    /// exactly as it was before the call.
    pub fn put(&self, key: K, value: V) -> Result<Put, MapError> {
        let hash = make_insert_hash::<K, H>(&self.shared.hash_builder, &key);
        let now = self.shared.clock.now_millis();

        self.shared.table.write().put(key, value, hash, now)
    }

    /// Returns a clone of the value stored under `k`.
    ///
    /// Reading does not refresh the entry's timestamp.
    pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        V: Clone,
    {
        let hash = make_hash::<K, Q, H>(&self.shared.hash_builder, k);

        let table = self.shared.table.read();
        let key = table.find(hash, equivalent_key(k))?;
        table.entry(key).map(|entry| entry.value.clone())
    }

    pub fn contains<Q: ?Sized>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = make_hash::<K, Q, H>(&self.shared.hash_builder, k);
        self.shared
            .table
            .read()
            .find(hash, equivalent_key(k))
            .is_some()
    }

    /// Removes `k`, returning its value if it was present.
    pub fn remove<Q: ?Sized>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = make_hash::<K, Q, H>(&self.shared.hash_builder, k);
        self.shared
            .table
            .write()
            .remove(hash, equivalent_key(k))
            .map(|entry| entry.value)
    }
}

impl<K, V, H> Drop for ExpiringMap<K, V, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.take() {
            if let Err(err) = TimerService::global().unregister(handle) {
                warn!(error = %err, "failed to cancel expiration sweep");
            }
        }
    }
}

/// Configures and builds an [`ExpiringMap`].
pub struct Builder<K, V, H> {
    config: MapConfig,
    callback: Option<ExpiredCallback<K>>,
    clock: Arc<dyn Clock>,
    hash_builder: H,
    _marker: std::marker::PhantomData<fn() -> V>,
}

impl<K, V> Builder<K, V, DefaultHashBuilder> {
    fn new() -> Self {
        Self {
            config: MapConfig::default(),
            callback: None,
            clock: Arc::new(SystemClock),
            hash_builder: DefaultHashBuilder::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V, H> Builder<K, V, H> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: MapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn load_factor(mut self, load_factor: f32) -> Self {
        self.config.load_factor = load_factor;
        self
    }

    /// See [`MapConfig::with_sweep_period`].
    pub fn sweep_period(mut self, period: Duration) -> Self {
        self.config.sweep_period = period;
        self
    }

    /// Sets the callback invoked with each expired key on every sweep.
    pub fn on_expired<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Sets the time source used for entry timestamps and expiry checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the hasher used to pick buckets.
    pub fn hasher<S>(self, hash_builder: S) -> Builder<K, V, S> {
        Builder {
            config: self.config,
            callback: self.callback,
            clock: self.clock,
            hash_builder,
            _marker: std::marker::PhantomData,
        }
    }

    /// Builds the map, registering its sweep with the global
    /// [`TimerService`] when a sweep period is set.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or when the sweep cannot be
    /// scheduled.
    pub fn build(self) -> Result<ExpiringMap<K, V, H>, MapError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
        H: BuildHasher + Send + Sync + 'static,
    {
        self.config.validate()?;

        let period = self.config.sweep_period;
        let mut map = ExpiringMap::from_parts(
            Table::new(self.config.capacity, self.config.load_factor),
            self.hash_builder,
            self.clock,
            Sweep::new(period, self.callback),
        );

        if !period.is_zero() {
            let shared = Arc::downgrade(&map.shared);
            let handle = TimerService::global().register(period, period, move || {
                if let Some(shared) = shared.upgrade() {
                    shared.sweep();
                }
            })?;

            debug!(?handle, ?period, "scheduled expiration sweep");
            map.timer = Some(handle);
        }

        Ok(map)
    }
}

#[cfg(test)]
mod test_map {
    use super::{ExpiringMap, Put};
    use crate::clock::ManualClock;
    use crate::error::{MapError, TimerError};

    use once_cell::sync::OnceCell;

    use std::hash::{BuildHasherDefault, Hasher};
    use std::sync::{Arc, Mutex, Weak};
    use std::time::Duration;

    /// Sends every key to bucket zero.
    #[derive(Default)]
    struct SameBucket;

    impl Hasher for SameBucket {
        fn finish(&self) -> u64 {
            0
        }

        fn write(&mut self, _: &[u8]) {}
    }

    fn manual_map(
        clock: &Arc<ManualClock>,
        period: Duration,
    ) -> ExpiringMap<&'static str, i32> {
        ExpiringMap::builder()
            .capacity(8)
            .sweep_period(period)
            .clock(clock.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert() {
        let map = ExpiringMap::new();

        assert_eq!(map.len(), 0);
        assert_eq!(map.put(0, 0).unwrap(), Put::Inserted);
        assert_eq!(map.len(), 1);
        assert_eq!(map.put(1, 1).unwrap(), Put::Inserted);
        assert_eq!(map.len(), 2);

        assert_eq!(map.put(1, 2).unwrap(), Put::Updated);
        assert_eq!(map.len(), 2);

        assert_eq!(map.get(&0), Some(0));
        assert_eq!(map.get(&1), Some(2));
    }

    #[test]
    fn test_get() {
        let map = ExpiringMap::new();

        assert!(map.get(&0).is_none());
        assert!(map.get(&1).is_none());

        map.put(0, 0).unwrap();
        map.put(1, 1).unwrap();

        assert_eq!(map.get(&0), Some(0));
        assert_eq!(map.get(&1), Some(1));
    }

    #[test]
    fn test_get_borrowed_key() {
        let map = ExpiringMap::new();
        map.put(String::from("key"), 7).unwrap();

        assert_eq!(map.get("key"), Some(7));
        assert!(map.contains("key"));
        assert_eq!(map.remove("key"), Some(7));
    }

    #[test]
    fn test_contains() {
        let map = ExpiringMap::new();

        assert!(!map.contains(&0));
        assert!(!map.contains(&1));

        map.put(0, 0).unwrap();

        assert!(map.contains(&0));
        assert!(!map.contains(&1));

        assert!(map.remove(&0).is_some());

        assert!(!map.contains(&0));
    }

    #[test]
    fn test_remove() {
        let map = ExpiringMap::new();

        assert!(map.remove(&0).is_none());
        map.put(0, 1).unwrap();
        assert_eq!(map.len(), 1);

        assert_eq!(map.remove(&0), Some(1));
        assert_eq!(map.len(), 0);
        assert!(map.remove(&0).is_none());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_clear() {
        let map = ExpiringMap::with_capacity(4);

        assert!(map.is_empty());

        for i in 1..=4 {
            map.put(i, i).unwrap();
        }
        let capacity = map.capacity();

        assert!(!map.is_empty());

        map.clear();

        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
        assert!(map.keys().next().is_none());

        map.put(9, 9).unwrap();
        assert_eq!(map.get(&9), Some(9));
    }

    #[test]
    fn test_len() {
        let map = ExpiringMap::new();

        assert_eq!(map.len(), 0);

        map.put(1, 1).unwrap();
        assert_eq!(map.len(), 1);

        map.put(2, 2).unwrap();
        assert_eq!(map.len(), 2);

        map.remove(&1);
        assert_eq!(map.len(), 1);

        map.remove(&2);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_growth_from_four_to_sixteen() {
        let map = ExpiringMap::builder()
            .capacity(4)
            .load_factor(0.75)
            .build()
            .unwrap();
        assert_eq!(map.threshold(), 3);

        map.put("a", 1).unwrap();
        map.put("b", 2).unwrap();
        assert_eq!(map.capacity(), 4);

        map.put("c", 3).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.capacity(), 16);

        assert_eq!(map.get(&"a"), Some(1));
        assert_eq!(map.get(&"b"), Some(2));
        assert_eq!(map.get(&"c"), Some(3));
    }

    #[test]
    fn test_growth_keeps_timestamps() {
        let clock = Arc::new(ManualClock::new(0));
        let map = ExpiringMap::builder()
            .capacity(4)
            .clock(clock.clone())
            .sweep_period(Duration::from_secs(1))
            .build()
            .unwrap();

        map.put("old", 1).unwrap();
        clock.set(10_000);
        map.put("b", 2).unwrap();
        map.put("c", 3).unwrap();
        assert_eq!(map.capacity(), 16);

        let expired: Vec<_> = map.expired_keys(10_500).collect();
        assert_eq!(expired, vec![("old", 1)]);
    }

    #[test]
    fn test_keys_yields_every_entry_once() {
        let map = ExpiringMap::with_capacity(4);
        for i in 0..100 {
            map.put(i, i * 10).unwrap();
        }

        let mut pairs: Vec<_> = map.keys().collect();
        pairs.sort();

        assert_eq!(pairs.len(), map.len());
        assert_eq!(pairs, (0..100).map(|i| (i, i * 10)).collect::<Vec<_>>());
    }

    #[test]
    fn test_keys_reset() {
        let map = ExpiringMap::new();
        map.put(1, 1).unwrap();
        map.put(2, 2).unwrap();

        let mut iter = map.keys();
        assert_eq!(iter.by_ref().count(), 2);
        assert!(iter.next().is_none());

        iter.reset();
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn test_keys_tolerates_removal_between_steps() {
        let map = ExpiringMap::with_capacity(64);
        for i in 0..10 {
            map.put(i, i).unwrap();
        }

        let mut seen = Vec::new();
        let mut iter = map.keys();
        while let Some((k, _)) = iter.next() {
            seen.push(k);
            map.remove(&k);
        }

        assert_eq!(seen.len(), 10);
        assert!(map.is_empty());
    }

    #[test]
    fn test_keys_tolerates_growth_between_steps() {
        let map = ExpiringMap::with_capacity(4);
        map.put(0, 0).unwrap();
        map.put(1, 1).unwrap();

        let mut iter = map.keys();
        assert!(iter.next().is_some());

        for i in 2..50 {
            map.put(i, i).unwrap();
        }

        // weakly consistent: no guarantee on content, but the walk ends and
        // only yields live pairs.
        for (k, v) in iter {
            assert_eq!(k, v);
            assert!(map.contains(&k));
        }
    }

    #[test]
    fn test_expired_keys() {
        let clock = Arc::new(ManualClock::new(1_000));
        let map = manual_map(&clock, Duration::from_secs(1));

        map.put("a", 1).unwrap();
        clock.advance(Duration::from_millis(600));
        map.put("b", 2).unwrap();
        clock.advance(Duration::from_millis(600));
        map.put("c", 3).unwrap();

        let now = map.now();
        assert_eq!(now, 2_200);

        // a is 1200ms old, b 600ms, c 0ms.
        let expired: Vec<_> = map.expired_keys(now).collect();
        assert_eq!(expired, vec![("a", 1)]);

        let mut expired: Vec<_> = map.expired_keys(now + 1_000).map(|(k, _)| k).collect();
        expired.sort();
        assert_eq!(expired, vec!["a", "b"]);

        // exactly one period old is not expired yet.
        assert_eq!(map.expired_keys(2_000).count(), 0);
        assert_eq!(map.expired_keys(2_001).count(), 1);
    }

    #[test]
    fn test_put_refreshes_timestamp() {
        let clock = Arc::new(ManualClock::new(0));
        let map = manual_map(&clock, Duration::from_secs(1));

        map.put("a", 1).unwrap();
        clock.set(5_000);
        assert_eq!(map.expired_keys(5_000).count(), 1);

        map.put("a", 2).unwrap();
        assert_eq!(map.expired_keys(5_000).count(), 0);

        // reads do not touch.
        clock.set(9_000);
        assert_eq!(map.get(&"a"), Some(2));
        assert_eq!(map.expired_keys(9_000).collect::<Vec<_>>(), vec![("a", 2)]);
    }

    #[test]
    fn test_expired_keys_without_period() {
        let map = ExpiringMap::new();
        map.put("a", 1).unwrap();

        assert_eq!(map.sweep_period(), Duration::ZERO);
        assert_eq!(map.expired_keys(i64::MAX).count(), 0);
    }

    #[test]
    fn test_sweep_reports_without_removing() {
        let clock = Arc::new(ManualClock::new(0));
        let reported = Arc::new(Mutex::new(Vec::new()));

        let sink = reported.clone();
        let map = ExpiringMap::builder()
            .sweep_period(Duration::from_secs(3600))
            .clock(clock.clone())
            .on_expired(move |k: &&'static str| sink.lock().unwrap().push(*k))
            .build()
            .unwrap();

        map.put("x", 1).unwrap();
        map.put("y", 2).unwrap();
        clock.set(3_600_001);
        map.put("y", 3).unwrap();

        map.shared.sweep();

        assert_eq!(*reported.lock().unwrap(), vec!["x"]);
        assert_eq!(map.get(&"x"), Some(1));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_sweep_reports_each_key_once_while_callback_evicts() {
        type Map = ExpiringMap<&'static str, i32, BuildHasherDefault<SameBucket>>;

        let clock = Arc::new(ManualClock::new(0));
        let reported = Arc::new(Mutex::new(Vec::new()));
        let target: Arc<OnceCell<Weak<Map>>> = Arc::new(OnceCell::new());

        let sink = reported.clone();
        let evictor = target.clone();
        let map: Arc<Map> = Arc::new(
            ExpiringMap::builder()
                .capacity(1)
                .load_factor(10.0)
                .sweep_period(Duration::from_secs(3600))
                .clock(clock.clone())
                .hasher(BuildHasherDefault::<SameBucket>::default())
                .on_expired(move |k: &&'static str| {
                    sink.lock().unwrap().push(*k);
                    if *k == "b" {
                        if let Some(map) = evictor.get().and_then(|w| w.upgrade()) {
                            map.remove(k);
                        }
                    }
                })
                .build()
                .unwrap(),
        );
        let _ = target.set(Arc::downgrade(&map));

        map.put("a", 1).unwrap();
        map.put("b", 2).unwrap();
        map.put("c", 3).unwrap();
        assert_eq!(map.capacity(), 1);
        clock.set(3_600_001);

        map.shared.sweep();

        // one chain, newest first; "b" evicted in the middle of the walk.
        assert_eq!(*reported.lock().unwrap(), vec!["c", "b", "a"]);
        assert_eq!(map.len(), 2);
        assert!(!map.contains(&"b"));
    }

    #[test]
    fn test_huge_sweep_period_is_an_error() {
        let result = ExpiringMap::<u32, u32>::builder()
            .sweep_period(Duration::MAX)
            .build();

        assert!(matches!(
            result,
            Err(MapError::Timer(TimerError::DelayTooLarge(_)))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ExpiringMap::<u32, u32>::builder().capacity(0).build();
        assert!(result.is_err());

        let result = ExpiringMap::<u32, u32>::builder().load_factor(-0.5).build();
        assert!(result.is_err());
    }
}
