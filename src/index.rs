//! Sharded concurrent index: fingerprint-routed map from key to live entry.
//!
//! The index is the only structure mutated on the caller's thread. It is
//! split into 64 shards, each a `parking_lot::RwLock` around an `FxHashMap`;
//! the shard is picked from the high bits of the key's fingerprint so it is
//! decorrelated from the sketch and bucket indices derived from the low
//! bits.
//!
//! ## Guarantees
//!
//! - At most one live entry per key; an entry is flagged dead in the same
//!   critical section that unmaps it, so the map never holds dead entries.
//! - [`compute`](Index::compute) runs the caller's closure **at most once**,
//!   under the shard's write lock, and applies the returned [`IndexOp`]
//!   only after the closure returns. A panic inside the closure unwinds
//!   through the lock guard leaving the shard untouched.
//! - Readers of other shards are never blocked by a mutation.
//!
//! Shard locks are leaf locks: no other cache lock is ever acquired while
//! one is held, except by the maintenance pass, which is allowed to take a
//! shard lock while holding the policy lock (never the other way around).

use std::hash::Hash;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::entry::EntryRef;

/// Number of index shards. Power of two.
const SHARDS: usize = 64;

/// Mutation selected by a [`compute`](Index::compute) closure.
pub(crate) enum IndexOp<K, V> {
    /// Leave the shard unchanged.
    Retain,
    /// Map the key to this entry, displacing any current one.
    Insert(EntryRef<K, V>),
    /// Unmap the key.
    Remove,
}

/// Fingerprint-sharded concurrent map from key to live entry.
#[derive(Debug)]
pub(crate) struct Index<K, V> {
    shards: Box<[RwLock<FxHashMap<K, EntryRef<K, V>>>]>,
}

impl<K, V> Index<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(initial_capacity: usize) -> Self {
        let per_shard = initial_capacity.div_ceil(SHARDS);
        let shards = (0..SHARDS)
            .map(|_| RwLock::new(FxHashMap::with_capacity_and_hasher(per_shard, Default::default())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    #[inline]
    fn shard(&self, fingerprint: u64) -> &RwLock<FxHashMap<K, EntryRef<K, V>>> {
        // High bits: the low bits feed the sketch and bucket indices.
        &self.shards[(fingerprint >> 58) as usize & (SHARDS - 1)]
    }

    /// Looks up the live entry for `key`, if any.
    pub(crate) fn get(&self, fingerprint: u64, key: &K) -> Option<EntryRef<K, V>> {
        self.shard(fingerprint).read().get(key).cloned()
    }

    /// Runs `f` with the current entry for `key` under the shard write lock
    /// and applies the mutation it selects. `f` is invoked exactly once; the
    /// shard is mutated only after `f` returns.
    pub(crate) fn compute<R>(
        &self,
        fingerprint: u64,
        key: &K,
        f: impl FnOnce(Option<&EntryRef<K, V>>) -> (IndexOp<K, V>, R),
    ) -> R {
        let mut shard = self.shard(fingerprint).write();
        let (op, result) = f(shard.get(key));
        match op {
            IndexOp::Retain => {}
            IndexOp::Insert(entry) => {
                shard.insert(key.clone(), entry);
            }
            IndexOp::Remove => {
                shard.remove(key);
            }
        }
        result
    }

    /// Unmaps `entry` if it is still the live entry for its key, killing it
    /// and running `on_removed` inside the critical section. Returns whether
    /// the removal happened. Used by eviction and expiration, which race
    /// against writers replacing the key.
    pub(crate) fn remove_if_same(
        &self,
        entry: &EntryRef<K, V>,
        on_removed: impl FnOnce(),
    ) -> bool {
        let mut shard = self.shard(entry.fingerprint()).write();
        match shard.get(entry.key()) {
            Some(current) if std::sync::Arc::ptr_eq(current, entry) => {
                shard.remove(entry.key());
                entry.kill();
                on_removed();
                true
            }
            _ => false,
        }
    }

    /// Number of live entries, summed shard by shard. Loosely consistent
    /// under concurrent mutation.
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Empties every shard, killing each entry and running `per_entry`
    /// inside its shard's critical section. Returns the removed entries in
    /// removal order.
    pub(crate) fn drain(
        &self,
        mut per_entry: impl FnMut(&EntryRef<K, V>),
    ) -> Vec<EntryRef<K, V>> {
        let mut removed = Vec::new();
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            for (_, entry) in shard.drain() {
                entry.kill();
                per_entry(&entry);
                removed.push(entry);
            }
        }
        removed
    }

    /// Number of shards, for iteration.
    #[inline]
    pub(crate) fn shard_count(&self) -> usize {
        SHARDS
    }

    /// Clones the entries of one shard. Iteration builds its weakly
    /// consistent view from these per-shard snapshots.
    pub(crate) fn snapshot_shard(&self, index: usize) -> Vec<EntryRef<K, V>> {
        self.shards[index].read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use std::sync::Arc;

    fn entry(key: u64, value: &'static str) -> EntryRef<u64, &'static str> {
        Arc::new(Entry::new(key, value, key, 1, i64::MAX))
    }

    #[test]
    fn insert_and_get() {
        let index: Index<u64, &str> = Index::new(16);
        let e = entry(1, "one");
        index.compute(e.fingerprint(), &1, |current| {
            assert!(current.is_none());
            (IndexOp::Insert(e.clone()), ())
        });

        let found = index.get(e.fingerprint(), &1).unwrap();
        assert!(Arc::ptr_eq(&found, &e));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn compute_sees_current_entry() {
        let index: Index<u64, &str> = Index::new(16);
        let first = entry(7, "first");
        index.compute(first.fingerprint(), &7, |_| (IndexOp::Insert(first.clone()), ()));

        let second = entry(7, "second");
        index.compute(second.fingerprint(), &7, |current| {
            assert!(Arc::ptr_eq(current.unwrap(), &first));
            (IndexOp::Insert(second.clone()), ())
        });

        assert_eq!(*index.get(second.fingerprint(), &7).unwrap().value(), "second");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn retain_leaves_shard_unchanged() {
        let index: Index<u64, &str> = Index::new(16);
        index.compute(1, &1, |current| {
            assert!(current.is_none());
            (IndexOp::Retain, ())
        });
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn panic_in_closure_mutates_nothing() {
        let index: Index<u64, &str> = Index::new(16);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            index.compute(3, &3, |_| -> (IndexOp<u64, &str>, ()) {
                panic!("callback failure");
            });
        }));
        assert!(result.is_err());
        assert_eq!(index.len(), 0);
        // The shard lock was released on unwind.
        assert!(index.get(3, &3).is_none());
    }

    #[test]
    fn remove_if_same_is_identity_checked() {
        let index: Index<u64, &str> = Index::new(16);
        let first = entry(9, "first");
        index.compute(first.fingerprint(), &9, |_| (IndexOp::Insert(first.clone()), ()));

        let second = entry(9, "second");
        index.compute(second.fingerprint(), &9, |_| (IndexOp::Insert(second.clone()), ()));

        // The displaced entry no longer matches.
        assert!(!index.remove_if_same(&first, || {}));
        assert!(index.remove_if_same(&second, || {}));
        assert!(!second.is_alive());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn drain_kills_everything() {
        let index: Index<u64, &str> = Index::new(16);
        for key in 0..100 {
            let e = entry(key, "v");
            index.compute(e.fingerprint(), &key, |_| (IndexOp::Insert(e.clone()), ()));
        }

        let mut seen = 0;
        let removed = index.drain(|_| seen += 1);
        assert_eq!(seen, 100);
        assert_eq!(removed.len(), 100);
        assert!(removed.iter().all(|e| !e.is_alive()));
        assert_eq!(index.len(), 0);
    }
}
