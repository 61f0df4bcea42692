use crate::clock::TimestampMillis;
use crate::config::threshold;
use crate::entry::{Entry, EntryKey};
use crate::error::MapError;
use crate::hash::bucket_index;
use crate::map::Put;

use slotmap::SlotMap;
use tracing::debug;

/// Capacity multiplier applied on every growth.
pub(crate) const GROWTH_FACTOR: usize = 4;

/// Separate-chaining hash table.
///
/// Entries live in a generational arena and every bucket holds the handle of
/// the first entry of its chain. The arena length is the number of live
/// entries, which always equals the sum of the chain lengths.
pub(crate) struct Table<K, V> {
    entries: SlotMap<EntryKey, Entry<K, V>>,
    buckets: Vec<Option<EntryKey>>,
    load_factor: f32,
    threshold: usize,
}

impl<K, V> Table<K, V> {
    pub fn new(capacity: usize, load_factor: f32) -> Self {
        let capacity = capacity.max(1);

        Self {
            entries: SlotMap::with_key(),
            buckets: vec![None; capacity],
            load_factor,
            threshold: threshold(capacity, load_factor),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[inline]
    pub fn entry(&self, key: EntryKey) -> Option<&Entry<K, V>> {
        self.entries.get(key)
    }

    pub fn find<F>(&self, hash: u64, eq: F) -> Option<EntryKey>
    where
        F: Fn(&Entry<K, V>) -> bool,
    {
        let mut cursor = self.buckets[bucket_index(hash, self.capacity())];
        while let Some(key) = cursor {
            let entry = &self.entries[key];
            if entry.hash == hash && eq(entry) {
                return Some(key);
            }

            cursor = entry.next;
        }

        None
    }

    /// Inserts or updates `key`, growing the table when the insert reaches
    /// the threshold.
    ///
    /// On error nothing has been modified.
    pub fn put(
        &mut self,
        key: K,
        value: V,
        hash: u64,
        now: TimestampMillis,
    ) -> Result<Put, MapError>
    where
        K: Eq,
    {
        if let Some(existing) = self.find(hash, |e| e.key == key) {
            let entry = &mut self.entries[existing];
            entry.value = value;
            entry.touched_at = now;
            return Ok(Put::Updated);
        }

        // allocate before linking so a failed growth leaves the table untouched.
        let grown = if self.entries.len() + 1 >= self.threshold {
            Some(allocate_buckets(self.capacity())?)
        } else {
            None
        };

        let index = bucket_index(hash, self.capacity());
        let mut entry = Entry::new(key, value, hash, now);
        entry.next = self.buckets[index];
        self.buckets[index] = Some(self.entries.insert(entry));

        if let Some(buckets) = grown {
            self.rehash(buckets);
        }

        Ok(Put::Inserted)
    }

    pub fn remove<F>(&mut self, hash: u64, eq: F) -> Option<Entry<K, V>>
    where
        F: Fn(&Entry<K, V>) -> bool,
    {
        let index = bucket_index(hash, self.capacity());

        let mut prev: Option<EntryKey> = None;
        let mut cursor = self.buckets[index];
        while let Some(key) = cursor {
            let entry = &self.entries[key];
            if entry.hash == hash && eq(entry) {
                let next = entry.next;
                match prev {
                    Some(prev) => self.entries[prev].next = next,
                    None => self.buckets[index] = next,
                }

                return self.entries.remove(key);
            }

            prev = Some(key);
            cursor = entry.next;
        }

        None
    }

    /// Drops every entry. Capacity and threshold are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.iter_mut().for_each(|b| *b = None);
    }

    /// Relinks every entry into `buckets`. Entries keep their arena slot and
    /// their timestamp; only the chain links change.
    fn rehash(&mut self, mut buckets: Vec<Option<EntryKey>>) {
        let capacity = buckets.len();
        for (key, entry) in self.entries.iter_mut() {
            let index = bucket_index(entry.hash, capacity);
            entry.next = buckets[index];
            buckets[index] = Some(key);
        }

        debug!(
            from = self.capacity(),
            to = capacity,
            entries = self.entries.len(),
            "grew bucket table"
        );

        self.buckets = buckets;
        self.threshold = threshold(capacity, self.load_factor);
    }
}

/// Allocates the bucket array that replaces one of `capacity` buckets.
fn allocate_buckets(capacity: usize) -> Result<Vec<Option<EntryKey>>, MapError> {
    let new_capacity = capacity
        .checked_mul(GROWTH_FACTOR)
        .ok_or(MapError::CapacityOverflow { capacity })?;

    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(new_capacity)
        .map_err(|source| MapError::Allocation {
            buckets: new_capacity,
            source,
        })?;
    buckets.resize(new_capacity, None);

    Ok(buckets)
}

/// Position of a step-at-a-time walk over a [`Table`].
///
/// `position` is the next bucket to scan. `current` is the entry last
/// yielded; following its `next` link stays correct after a rehash because
/// the link is rewritten together with the bucket array. `successor` is that
/// link as it was when `current` was yielded, kept so the walk can resume
/// after `current` is removed.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Cursor {
    position: usize,
    current: Option<EntryKey>,
    successor: Option<EntryKey>,
}

impl Cursor {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Moves to the next entry accepted by `pred`.
    ///
    /// If the current entry has been removed since the last step, the walk
    /// resumes at the entry that followed it. Only when that one is gone too
    /// is the bucket rescanned from its head, so entries linked ahead of the
    /// removed one may be yielded again.
    pub fn advance<K, V, P>(&mut self, table: &Table<K, V>, pred: P) -> Option<EntryKey>
    where
        P: Fn(&Entry<K, V>) -> bool,
    {
        let mut chain = match self.current {
            Some(current) => match table.entries.get(current) {
                Some(entry) => entry.next,
                None => self.resume_after_removed(table),
            },
            None => None,
        };

        loop {
            while let Some(key) = chain {
                let entry = &table.entries[key];
                if pred(entry) {
                    self.current = Some(key);
                    self.successor = entry.next;
                    return Some(key);
                }

                chain = entry.next;
            }

            if self.position >= table.capacity() {
                self.current = None;
                self.successor = None;
                return None;
            }

            chain = table.buckets[self.position];
            self.position += 1;
        }
    }

    fn resume_after_removed<K, V>(&self, table: &Table<K, V>) -> Option<EntryKey> {
        match self.successor {
            // current was the tail of its chain.
            None => None,
            Some(successor) if table.entries.contains_key(successor) => Some(successor),
            Some(_) => self
                .position
                .checked_sub(1)
                .and_then(|bucket| table.buckets.get(bucket).copied().flatten()),
        }
    }
}
