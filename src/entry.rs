use crate::clock::TimestampMillis;

slotmap::new_key_type! {
    /// Generational handle of an entry in a table's arena.
    ///
    /// A handle outlives rehashing: relinking chains never moves an entry, so
    /// a cursor holding a handle keeps following the entry's current chain.
    /// Once the entry is removed the handle resolves to nothing.
    pub(crate) struct EntryKey;
}

/// A key-value pair and its link to the next entry in the same bucket chain.
pub(crate) struct Entry<K, V> {
    pub key: K,
    pub value: V,
    /// Full hash of `key`, computed once at insertion and reused by rehash.
    pub hash: u64,
    pub touched_at: TimestampMillis,
    pub next: Option<EntryKey>,
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, value: V, hash: u64, touched_at: TimestampMillis) -> Self {
        Self {
            key,
            value,
            hash,
            touched_at,
            next: None,
        }
    }

    /// Whether the entry is older than `period_ms` as of `as_of`.
    #[inline]
    pub fn is_expired(&self, as_of: TimestampMillis, period_ms: i64) -> bool {
        as_of.saturating_sub(self.touched_at) > period_ms
    }
}
