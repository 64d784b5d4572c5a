//! Deletion events and the executor that delivers them.
//!
//! Every entry that leaves the cache produces exactly one [`DeletionEvent`]
//! carrying a [`DeletionCause`]. Asynchronous listeners receive the event on
//! the user-supplied [`Executor`]; the synchronous (atomic) listener runs
//! under the shard lock before the removal becomes observable.
//!
//! ## Cause Taxonomy
//!
//! | Cause          | Trigger                                   | Counts as eviction |
//! |----------------|-------------------------------------------|--------------------|
//! | `Invalidation` | explicit `invalidate` / `invalidate_all`  | no                 |
//! | `Replacement`  | overwrite by `set` / `compute`            | no                 |
//! | `Overflow`     | capacity pressure (S3-FIFO victim)        | yes                |
//! | `Expiration`   | deadline reached                          | yes                |

use std::sync::Arc;

/// Why an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionCause {
    /// The entry was removed by an explicit call.
    Invalidation,
    /// The entry was superseded by a write to the same key.
    Replacement,
    /// The entry was evicted under capacity pressure.
    Overflow,
    /// The entry's deadline passed.
    Expiration,
}

impl DeletionCause {
    /// Returns `true` when the removal was decided by the cache itself
    /// rather than by the caller. Only these causes count toward eviction
    /// statistics.
    #[inline]
    pub fn was_evicted(self) -> bool {
        matches!(self, DeletionCause::Overflow | DeletionCause::Expiration)
    }
}

/// Notification handed to deletion listeners.
///
/// Carries owned clones of the retired key and value, so listeners are free
/// to keep them past the callback.
#[derive(Debug, Clone)]
pub struct DeletionEvent<K, V> {
    /// Key of the retired entry.
    pub key: K,
    /// Value of the retired entry.
    pub value: V,
    /// Why the entry was removed.
    pub cause: DeletionCause,
}

/// A unit of deferred work produced by the cache.
pub type Job = Box<dyn FnOnce() + Send>;

/// Runs deferred cache work (deletion notifications, scheduled maintenance).
///
/// The cache assumes nothing about ordering across submitted jobs and never
/// blocks on them. An inline executor (`Arc::new(|job: Job| job())`) is the
/// right choice for deterministic tests.
pub type Executor = Arc<dyn Fn(Job) + Send + Sync>;

/// Listener invoked with a [`DeletionEvent`].
pub(crate) type Listener<K, V> = Arc<dyn Fn(DeletionEvent<K, V>) + Send + Sync>;

/// Default executor: one short-lived thread per job batch.
pub(crate) fn default_executor() -> Executor {
    Arc::new(|job: Job| {
        std::thread::spawn(job);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn eviction_causes() {
        assert!(DeletionCause::Overflow.was_evicted());
        assert!(DeletionCause::Expiration.was_evicted());
        assert!(!DeletionCause::Invalidation.was_evicted());
        assert!(!DeletionCause::Replacement.was_evicted());
    }

    #[test]
    fn inline_executor_runs_on_caller_thread() {
        let executor: Executor = Arc::new(|job: Job| job());
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        executor(Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_executor_eventually_runs() {
        let executor = default_executor();
        let (tx, rx) = std::sync::mpsc::channel();
        executor(Box::new(move || {
            tx.send(42u8).unwrap();
        }));
        assert_eq!(rx.recv().unwrap(), 42);
    }
}
