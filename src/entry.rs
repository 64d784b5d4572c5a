//! Cache entry: the unit owned by the cache.
//!
//! An entry owns its key and value and carries the bookkeeping the policy
//! and expiration engines need: the precomputed fingerprint, the weight, the
//! deadline, a queue tag, a small frequency snapshot, the alive flag, and
//! the arena node ids recording where the entry is linked.
//!
//! Field discipline:
//!
//! - `alive` and `expires_at` transition under the owning shard lock (or at
//!   creation time, before the entry is shared).
//! - `state`, `freq`, `policy_node`, and `timer_node` are only written under
//!   the maintenance lock. They are atomics so the struct stays `Sync`, not
//!   because they are contended.
//!
//! Values are never mutated in place: an overwrite creates a replacement
//! entry and retires this one.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crate::ds::arena::NIL;

/// Deadline value meaning "never expires".
pub(crate) const NO_DEADLINE: i64 = i64::MAX;

/// Largest per-entry frequency snapshot (2 bits).
pub(crate) const MAX_FREQ: u8 = 3;

/// Shared handle to a cache entry.
pub(crate) type EntryRef<K, V> = Arc<Entry<K, V>>;

/// Which policy queue an entry currently inhabits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum QueueTag {
    /// Not linked into any queue yet (or retired).
    Unassigned = 0,
    /// Probationary FIFO for fresh admissions.
    Small = 1,
    /// Protected FIFO for proven entries.
    Main = 2,
}

impl QueueTag {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => QueueTag::Small,
            2 => QueueTag::Main,
            _ => QueueTag::Unassigned,
        }
    }
}

/// A single cached key-value pair plus policy metadata.
#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    key: K,
    value: V,
    fingerprint: u64,
    weight: u32,
    expires_at: AtomicI64,
    state: AtomicU8,
    freq: AtomicU8,
    alive: AtomicBool,
    policy_node: AtomicU32,
    timer_node: AtomicU32,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, value: V, fingerprint: u64, weight: u32, expires_at: i64) -> Self {
        Self {
            key,
            value,
            fingerprint,
            weight,
            expires_at: AtomicI64::new(expires_at),
            state: AtomicU8::new(QueueTag::Unassigned as u8),
            freq: AtomicU8::new(0),
            alive: AtomicBool::new(true),
            policy_node: AtomicU32::new(NIL),
            timer_node: AtomicU32::new(NIL),
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub(crate) fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Entry weight; zero marks the entry as pinned (never an eviction
    /// victim).
    #[inline]
    pub(crate) fn weight(&self) -> u32 {
        self.weight
    }

    #[inline]
    pub(crate) fn is_pinned(&self) -> bool {
        self.weight == 0
    }

    #[inline]
    pub(crate) fn expires_at(&self) -> i64 {
        self.expires_at.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_expires_at(&self, deadline: i64) {
        self.expires_at.store(deadline, Ordering::Release);
    }

    #[inline]
    pub(crate) fn has_deadline(&self) -> bool {
        self.expires_at() != NO_DEADLINE
    }

    #[inline]
    pub(crate) fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at()
    }

    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the entry retired. Must happen in the same shard critical
    /// section that removes it from the index.
    #[inline]
    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }

    #[inline]
    pub(crate) fn state(&self) -> QueueTag {
        QueueTag::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set_state(&self, tag: QueueTag) {
        self.state.store(tag as u8, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn freq(&self) -> u8 {
        self.freq.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_freq(&self, freq: u8) {
        self.freq.store(freq.min(MAX_FREQ), Ordering::Relaxed);
    }

    /// Bumps the frequency snapshot, saturating at [`MAX_FREQ`].
    #[inline]
    pub(crate) fn bump_freq(&self) {
        let current = self.freq.load(Ordering::Relaxed);
        if current < MAX_FREQ {
            self.freq.store(current + 1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn policy_node(&self) -> u32 {
        self.policy_node.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_policy_node(&self, node: u32) {
        self.policy_node.store(node, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn timer_node(&self) -> u32 {
        self.timer_node.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_timer_node(&self, node: u32) {
        self.timer_node.store(node, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Entry<u64, &'static str> {
        Entry::new(1, "value", 0xDEAD_BEEF, 1, NO_DEADLINE)
    }

    #[test]
    fn fresh_entry_defaults() {
        let entry = entry();
        assert!(entry.is_alive());
        assert!(!entry.has_deadline());
        assert_eq!(entry.state(), QueueTag::Unassigned);
        assert_eq!(entry.freq(), 0);
        assert_eq!(entry.policy_node(), NIL);
        assert_eq!(entry.timer_node(), NIL);
        assert!(!entry.is_pinned());
    }

    #[test]
    fn kill_is_sticky() {
        let entry = entry();
        entry.kill();
        assert!(!entry.is_alive());
    }

    #[test]
    fn freq_saturates() {
        let entry = entry();
        for _ in 0..10 {
            entry.bump_freq();
        }
        assert_eq!(entry.freq(), MAX_FREQ);
        entry.set_freq(200);
        assert_eq!(entry.freq(), MAX_FREQ);
    }

    #[test]
    fn expiry_comparison() {
        let entry = Entry::new(1u64, "v", 0, 1, 1_000);
        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000));
        assert!(entry.is_expired(1_001));
        assert!(entry.has_deadline());
    }

    #[test]
    fn pinned_entry_has_zero_weight() {
        let entry = Entry::new(1u64, "v", 0, 0, NO_DEADLINE);
        assert!(entry.is_pinned());
        assert_eq!(entry.weight(), 0);
    }
}
