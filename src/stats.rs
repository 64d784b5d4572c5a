//! Statistics recording for cache operations.
//!
//! Mirrors the recorder/snapshot split used elsewhere in the library family:
//! recorders only write counters, snapshots only read them. The cache calls a
//! [`StatsRecorder`] on every read, and on every eviction or expiration with
//! the retired entry's weight.
//!
//! ## Key Components
//!
//! - [`StatsRecorder`]: write-side trait the cache invokes
//! - [`NoopStats`]: default recorder, all methods are no-ops
//! - [`StatsCounter`]: atomic counter recorder for production and tests
//! - [`StatsSnapshot`]: point-in-time copy of a [`StatsCounter`]
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use brimcache::{Builder, StatsCounter};
//!
//! let stats = Arc::new(StatsCounter::new());
//! let cache = Builder::new()
//!     .maximum_size(100)
//!     .stats(stats.clone())
//!     .build();
//!
//! cache.set(1u64, "one");
//! cache.get_if_present(&1);
//! cache.get_if_present(&2);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.hits, 1);
//! assert_eq!(snapshot.misses, 1);
//! assert_eq!(snapshot.hit_ratio(), 0.5);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Write-side statistics interface.
///
/// All methods must be cheap and thread-safe; they are called from hot read
/// paths and from the maintenance pass. Implementations must not call back
/// into the cache.
pub trait StatsRecorder: Send + Sync + 'static {
    /// Records `count` cache hits.
    fn record_hits(&self, count: u64);
    /// Records `count` cache misses.
    fn record_misses(&self, count: u64);
    /// Records one eviction (overflow or expiration) of an entry with the
    /// given weight.
    fn record_eviction(&self, weight: u32);
    /// Records a successful value computation taking `elapsed`.
    fn record_load_success(&self, elapsed: Duration);
    /// Records a failed value computation taking `elapsed`.
    fn record_load_failure(&self, elapsed: Duration);
}

/// Recorder that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsRecorder for NoopStats {
    #[inline]
    fn record_hits(&self, _count: u64) {}
    #[inline]
    fn record_misses(&self, _count: u64) {}
    #[inline]
    fn record_eviction(&self, _weight: u32) {}
    #[inline]
    fn record_load_success(&self, _elapsed: Duration) {}
    #[inline]
    fn record_load_failure(&self, _elapsed: Duration) {}
}

/// Atomic counter recorder.
///
/// All counters use `Relaxed` increments; a [`snapshot`](StatsCounter::snapshot)
/// is a loosely consistent copy, which is the usual contract for cache
/// statistics.
#[derive(Debug, Default)]
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    eviction_weight: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    total_load_nanos: AtomicU64,
}

impl StatsCounter {
    /// Creates a counter with all fields at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a loosely consistent copy of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            eviction_weight: self.eviction_weight.load(Ordering::Relaxed),
            load_successes: self.load_successes.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            total_load_time: Duration::from_nanos(self.total_load_nanos.load(Ordering::Relaxed)),
        }
    }
}

impl StatsRecorder for StatsCounter {
    #[inline]
    fn record_hits(&self, count: u64) {
        self.hits.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    fn record_misses(&self, count: u64) {
        self.misses.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    fn record_eviction(&self, weight: u32) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.eviction_weight
            .fetch_add(u64::from(weight), Ordering::Relaxed);
    }

    #[inline]
    fn record_load_success(&self, elapsed: Duration) {
        self.load_successes.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos
            .fetch_add(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_load_failure(&self, elapsed: Duration) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos
            .fetch_add(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);
    }
}

/// Point-in-time statistics copy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Number of lookups that found a live entry.
    pub hits: u64,
    /// Number of lookups that found nothing (or an expired entry).
    pub misses: u64,
    /// Number of entries removed by overflow or expiration.
    pub evictions: u64,
    /// Summed weight of evicted entries.
    pub eviction_weight: u64,
    /// Number of successful computations recorded.
    pub load_successes: u64,
    /// Number of failed computations recorded.
    pub load_failures: u64,
    /// Total time spent in recorded computations.
    pub total_load_time: Duration,
}

impl StatsSnapshot {
    /// Total number of recorded lookups.
    #[inline]
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups that hit, or `1.0` when nothing was recorded.
    #[inline]
    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests();
        if requests == 0 {
            1.0
        } else {
            self.hits as f64 / requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_ignores_everything() {
        let stats = NoopStats;
        stats.record_hits(1);
        stats.record_misses(1);
        stats.record_eviction(5);
        stats.record_load_success(Duration::from_secs(3600));
        stats.record_load_failure(Duration::from_secs(60));
    }

    #[test]
    fn counter_accumulates() {
        let stats = StatsCounter::new();
        stats.record_hits(3);
        stats.record_misses(1);
        stats.record_eviction(4);
        stats.record_eviction(0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.evictions, 2);
        assert_eq!(snapshot.eviction_weight, 4);
        assert_eq!(snapshot.requests(), 4);
        assert_eq!(snapshot.hit_ratio(), 0.75);
    }

    #[test]
    fn empty_counter_reports_full_ratio() {
        assert_eq!(StatsCounter::new().snapshot().hit_ratio(), 1.0);
    }

    #[test]
    fn load_times_accumulate() {
        let stats = StatsCounter::new();
        stats.record_load_success(Duration::from_millis(5));
        stats.record_load_failure(Duration::from_millis(7));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.load_successes, 1);
        assert_eq!(snapshot.load_failures, 1);
        assert_eq!(snapshot.total_load_time, Duration::from_millis(12));
    }

    #[test]
    fn concurrent_increments_do_not_lose_counts() {
        use std::sync::Arc;

        let stats = Arc::new(StatsCounter::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let stats = stats.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.record_hits(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().hits, 4000);
    }
}
