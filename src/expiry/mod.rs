//! Expiration engine.
//!
//! Two structures share the entry's deadline field:
//!
//! - [`fixed::FixedQueue`]: a single FIFO for the fixed-duration variants
//!   (`after_write`, `after_create`, `after_access`), where deadlines are
//!   monotone along the queue and an expiry scan walks from the head.
//! - [`wheel::TimerWheel`]: a 5-level hierarchical wheel for per-entry
//!   variable durations computed by a user [`Expiry`] implementation.
//!
//! [`ExpiryPolicy`] selects the variant at construction and computes
//! deadlines at each lifecycle point; [`TimerState`] is the maintenance-side
//! structure the deadlines are linked into.

use std::sync::Arc;
use std::time::Duration;

use crate::ds::arena::NIL;
use crate::entry::{EntryRef, NO_DEADLINE};

pub(crate) mod fixed;
pub(crate) mod wheel;

use fixed::FixedQueue;
use wheel::TimerWheel;

/// Per-entry expiration durations for the variable timer wheel.
///
/// Implementations must not call back into the cache. Returning
/// [`Duration::MAX`] means "never expires".
///
/// The default `update`/`read` hooks keep the previous deadline, so a
/// minimal implementation only decides a lifetime at creation.
pub trait Expiry<K, V>: Send + Sync + 'static {
    /// Lifetime granted when the entry is created.
    fn expire_after_create(&self, key: &K, value: &V, now: i64) -> Duration;

    /// Lifetime granted when the entry is overwritten. `remaining` is what
    /// was left of the predecessor's lifetime (zero if already due).
    fn expire_after_update(&self, key: &K, value: &V, now: i64, remaining: Duration) -> Duration {
        let _ = remaining;
        self.expire_after_create(key, value, now)
    }

    /// Lifetime granted when the entry is read. Defaults to keeping the
    /// current deadline.
    fn expire_after_read(&self, key: &K, value: &V, now: i64, remaining: Duration) -> Duration {
        let _ = (key, value, now);
        remaining
    }
}

/// How the cache computes deadlines, chosen at construction.
pub(crate) enum ExpiryPolicy<K, V> {
    /// No expiration at all.
    None,
    /// Deadline = last write + duration.
    FixedWrite(Duration),
    /// Deadline = creation + duration; overwrites inherit the deadline.
    FixedCreate(Duration),
    /// Deadline = last access (read or write) + duration.
    FixedAccess(Duration),
    /// Deadlines computed per entry by a user implementation.
    Variable(Arc<dyn Expiry<K, V>>),
}

impl<K, V> Clone for ExpiryPolicy<K, V> {
    fn clone(&self) -> Self {
        match self {
            ExpiryPolicy::None => ExpiryPolicy::None,
            ExpiryPolicy::FixedWrite(d) => ExpiryPolicy::FixedWrite(*d),
            ExpiryPolicy::FixedCreate(d) => ExpiryPolicy::FixedCreate(*d),
            ExpiryPolicy::FixedAccess(d) => ExpiryPolicy::FixedAccess(*d),
            ExpiryPolicy::Variable(f) => ExpiryPolicy::Variable(f.clone()),
        }
    }
}

/// Adds `duration` to `now`, saturating into [`NO_DEADLINE`].
#[inline]
pub(crate) fn deadline_after(now: i64, duration: Duration) -> i64 {
    if duration == Duration::MAX {
        return NO_DEADLINE;
    }
    let nanos = duration.as_nanos().min(i64::MAX as u128) as i64;
    now.saturating_add(nanos)
}

impl<K: 'static, V: 'static> ExpiryPolicy<K, V> {
    /// Whether reads can move deadlines, which requires draining the read
    /// buffer even for an unbounded cache.
    #[inline]
    pub(crate) fn refreshes_on_access(&self) -> bool {
        matches!(self, ExpiryPolicy::FixedAccess(_) | ExpiryPolicy::Variable(_))
    }

    /// Whether an overwrite keeps the predecessor's deadline and queue slot.
    #[inline]
    pub(crate) fn inherits_on_update(&self) -> bool {
        matches!(self, ExpiryPolicy::FixedCreate(_))
    }

    pub(crate) fn deadline_on_create(&self, key: &K, value: &V, now: i64) -> i64 {
        match self {
            ExpiryPolicy::None => NO_DEADLINE,
            ExpiryPolicy::FixedWrite(d)
            | ExpiryPolicy::FixedCreate(d)
            | ExpiryPolicy::FixedAccess(d) => deadline_after(now, *d),
            ExpiryPolicy::Variable(f) => deadline_after(now, f.expire_after_create(key, value, now)),
        }
    }

    pub(crate) fn deadline_on_update(&self, key: &K, value: &V, now: i64, old_deadline: i64) -> i64 {
        match self {
            ExpiryPolicy::None => NO_DEADLINE,
            ExpiryPolicy::FixedCreate(_) => old_deadline,
            ExpiryPolicy::FixedWrite(d) | ExpiryPolicy::FixedAccess(d) => deadline_after(now, *d),
            ExpiryPolicy::Variable(f) => {
                let remaining = Duration::from_nanos(old_deadline.saturating_sub(now).max(0) as u64);
                deadline_after(now, f.expire_after_update(key, value, now, remaining))
            }
        }
    }

    pub(crate) fn deadline_on_read(&self, key: &K, value: &V, now: i64, old_deadline: i64) -> i64 {
        match self {
            ExpiryPolicy::None | ExpiryPolicy::FixedWrite(_) | ExpiryPolicy::FixedCreate(_) => {
                old_deadline
            }
            ExpiryPolicy::FixedAccess(d) => deadline_after(now, *d),
            ExpiryPolicy::Variable(f) => {
                let remaining = Duration::from_nanos(old_deadline.saturating_sub(now).max(0) as u64);
                deadline_after(now, f.expire_after_read(key, value, now, remaining))
            }
        }
    }
}

/// Maintenance-side timer structure holding entries by deadline.
pub(crate) enum TimerState<K, V> {
    /// The cache never expires entries.
    None,
    /// Fixed-duration FIFO.
    Fixed(FixedQueue<K, V>),
    /// Hierarchical wheel for variable durations.
    Wheel(TimerWheel<K, V>),
}

impl<K, V> TimerState<K, V> {
    pub(crate) fn for_policy(policy: &ExpiryPolicy<K, V>, now: i64) -> Self {
        match policy {
            ExpiryPolicy::None => TimerState::None,
            ExpiryPolicy::FixedWrite(_)
            | ExpiryPolicy::FixedCreate(_)
            | ExpiryPolicy::FixedAccess(_) => TimerState::Fixed(FixedQueue::new()),
            ExpiryPolicy::Variable(_) => TimerState::Wheel(TimerWheel::new(now.max(0) as u64)),
        }
    }

    /// Links an entry by its current deadline. Entries without a deadline
    /// are not tracked.
    pub(crate) fn add(&mut self, entry: &EntryRef<K, V>) {
        if !entry.has_deadline() {
            return;
        }
        match self {
            TimerState::None => {}
            TimerState::Fixed(queue) => queue.add(entry),
            TimerState::Wheel(wheel) => wheel.add(entry.clone()),
        }
    }

    /// Unlinks an entry, tolerating entries that were never linked.
    pub(crate) fn remove(&mut self, entry: &EntryRef<K, V>) {
        if entry.timer_node() == NIL {
            return;
        }
        match self {
            TimerState::None => {}
            TimerState::Fixed(queue) => queue.remove(entry),
            TimerState::Wheel(wheel) => wheel.remove(entry),
        }
    }

    /// Replaces `old` with `new` at the predecessor's queue position. Used
    /// by creation-time expiry, where the replacement inherits the deadline
    /// and therefore the old slot keeps the queue ordered.
    pub(crate) fn replace_in_place(&mut self, old: &EntryRef<K, V>, new: &EntryRef<K, V>) {
        match self {
            TimerState::None => {}
            TimerState::Fixed(queue) => queue.replace_in_place(old, new),
            TimerState::Wheel(wheel) => {
                // Wheel placement depends only on the deadline.
                wheel.remove(old);
                if new.has_deadline() {
                    wheel.add(new.clone());
                }
            }
        }
    }

    /// Relinks an entry after its deadline moved on access.
    pub(crate) fn on_access(&mut self, entry: &EntryRef<K, V>) {
        match self {
            TimerState::None => {}
            TimerState::Fixed(queue) => queue.move_to_back(entry),
            TimerState::Wheel(wheel) => {
                wheel.remove(entry);
                if entry.has_deadline() {
                    wheel.add(entry.clone());
                }
            }
        }
    }

    /// Unlinks every entry whose deadline is at or before `now` and hands it
    /// to `expire`, earliest bucket first.
    pub(crate) fn expire(&mut self, now: i64, expire: impl FnMut(EntryRef<K, V>)) {
        match self {
            TimerState::None => {}
            TimerState::Fixed(queue) => queue.expire(now, expire),
            TimerState::Wheel(wheel) => wheel.advance(now.max(0) as u64, expire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_saturates() {
        assert_eq!(deadline_after(i64::MAX - 1, Duration::from_secs(10)), NO_DEADLINE);
        assert_eq!(deadline_after(0, Duration::MAX), NO_DEADLINE);
        assert_eq!(deadline_after(5, Duration::from_nanos(10)), 15);
    }

    #[test]
    fn write_expiry_refreshes_on_update_only() {
        let policy: ExpiryPolicy<u64, u64> = ExpiryPolicy::FixedWrite(Duration::from_secs(1));
        let created = policy.deadline_on_create(&1, &1, 0);
        assert_eq!(created, 1_000_000_000);
        assert_eq!(policy.deadline_on_update(&1, &1, 500, created), 1_000_000_500);
        assert_eq!(policy.deadline_on_read(&1, &1, 900, created), created);
        assert!(!policy.refreshes_on_access());
    }

    #[test]
    fn create_expiry_inherits_on_update() {
        let policy: ExpiryPolicy<u64, u64> = ExpiryPolicy::FixedCreate(Duration::from_secs(1));
        let created = policy.deadline_on_create(&1, &1, 0);
        assert_eq!(policy.deadline_on_update(&1, &1, 900, created), created);
        assert!(policy.inherits_on_update());
    }

    #[test]
    fn access_expiry_refreshes_on_read() {
        let policy: ExpiryPolicy<u64, u64> = ExpiryPolicy::FixedAccess(Duration::from_secs(1));
        let created = policy.deadline_on_create(&1, &1, 0);
        assert_eq!(policy.deadline_on_read(&1, &1, 400, created), 1_000_000_400);
        assert!(policy.refreshes_on_access());
    }

    #[test]
    fn variable_defaults_keep_read_deadline() {
        struct PerKey;
        impl Expiry<u64, u64> for PerKey {
            fn expire_after_create(&self, key: &u64, _: &u64, _: i64) -> Duration {
                Duration::from_secs(*key)
            }
        }
        let policy: ExpiryPolicy<u64, u64> = ExpiryPolicy::Variable(Arc::new(PerKey));
        let created = policy.deadline_on_create(&3, &0, 0);
        assert_eq!(created, 3_000_000_000);
        // Default read hook keeps the remaining lifetime.
        assert_eq!(policy.deadline_on_read(&3, &0, 1_000_000_000, created), created);
        // Default update hook re-runs the create rule.
        assert_eq!(
            policy.deadline_on_update(&3, &0, 1_000_000_000, created),
            4_000_000_000
        );
    }
}
