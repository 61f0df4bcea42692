use crate::clock::TimestampMillis;
use crate::map::table::{Cursor, Table};
use crate::map::Shared;

use std::cell::Cell;
use std::marker::PhantomData;

/// An iterator over cloned `(K, V)` pairs of an [`ExpiringMap`](crate::ExpiringMap).
///
/// Each call to `next` holds the map's read lock only while it advances, so
/// writers can run between steps. The walk is weakly consistent: entries
/// inserted or removed concurrently may or may not be seen, and a growth in
/// the middle of the walk may skip some entries and repeat others. On a map
/// without concurrent writers every entry is yielded exactly once.
pub struct Iter<'a, K, V, H> {
    shared: &'a Shared<K, V, H>,
    cursor: Cursor,
    // the cursor is per-walk state, not meant to be shared between threads.
    _marker: PhantomData<Cell<()>>,
}

impl<'a, K, V, H> Iter<'a, K, V, H> {
    pub(crate) fn new(shared: &'a Shared<K, V, H>) -> Self {
        Self {
            shared,
            cursor: Cursor::default(),
            _marker: PhantomData,
        }
    }

    /// Restarts the walk from the first bucket.
    pub fn reset(&mut self) {
        self.cursor.reset();
    }
}

impl<'a, K, V, H> Iterator for Iter<'a, K, V, H>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let guard = self.shared.table.read();
        let table: &Table<K, V> = &guard;

        let key = self.cursor.advance(table, |_| true)?;
        table
            .entry(key)
            .map(|entry| (entry.key.clone(), entry.value.clone()))
    }
}

/// Like [`Iter`], but only yields entries whose age as of a fixed instant
/// exceeds the map's sweep period.
///
/// Yields nothing when the map has no sweep period.
pub struct ExpiredIter<'a, K, V, H> {
    shared: &'a Shared<K, V, H>,
    cursor: Cursor,
    as_of: TimestampMillis,
    _marker: PhantomData<Cell<()>>,
}

impl<'a, K, V, H> ExpiredIter<'a, K, V, H> {
    pub(crate) fn new(shared: &'a Shared<K, V, H>, as_of: TimestampMillis) -> Self {
        Self {
            shared,
            cursor: Cursor::default(),
            as_of,
            _marker: PhantomData,
        }
    }

    pub fn as_of(&self) -> TimestampMillis {
        self.as_of
    }

    pub fn reset(&mut self) {
        self.cursor.reset();
    }
}

impl<'a, K, V, H> Iterator for ExpiredIter<'a, K, V, H>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let sweep = &self.shared.sweep;
        if !sweep.is_enabled() {
            return None;
        }

        let as_of = self.as_of;
        let guard = self.shared.table.read();
        let table: &Table<K, V> = &guard;

        let key = self
            .cursor
            .advance(table, |entry| sweep.is_expired(entry, as_of))?;
        table
            .entry(key)
            .map(|entry| (entry.key.clone(), entry.value.clone()))
    }
}
