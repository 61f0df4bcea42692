use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::entry::Entry;

#[inline]
pub(crate) fn make_hash<K, Q, H>(hash_builder: &H, val: &Q) -> u64
where
    K: Borrow<Q>,
    Q: Hash + ?Sized,
    H: BuildHasher,
{
    let mut state = hash_builder.build_hasher();
    val.hash(&mut state);
    state.finish()
}

#[inline]
pub(crate) fn make_insert_hash<K, H>(hash_builder: &H, val: &K) -> u64
where
    K: Hash,
    H: BuildHasher,
{
    let mut state = hash_builder.build_hasher();
    val.hash(&mut state);
    state.finish()
}

/// Bucket selected by `hash` in a table of `capacity` buckets.
#[inline]
pub(crate) fn bucket_index(hash: u64, capacity: usize) -> usize {
    (hash % capacity as u64) as usize
}

#[inline]
pub(crate) fn equivalent_key<Q, K, V>(k: &Q) -> impl Fn(&Entry<K, V>) -> bool + '_
where
    K: Borrow<Q>,
    Q: ?Sized + Eq,
{
    move |entry| k.eq(entry.key.borrow())
}
