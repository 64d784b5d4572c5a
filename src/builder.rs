//! Cache builder: validates the option set and assembles the cache.
//!
//! Options fall into three groups:
//!
//! - **Capacity**: [`maximum_size`](Builder::maximum_size) (entry count)
//!   XOR [`maximum_weight`](Builder::maximum_weight) + a
//!   [`weigher`](Builder::weigher). Neither makes an unbounded cache.
//! - **Expiration**: one of the fixed durations
//!   ([`expire_after_write`](Builder::expire_after_write),
//!   [`expire_after_create`](Builder::expire_after_create),
//!   [`expire_after_access`](Builder::expire_after_access)) or a variable
//!   [`expiry`](Builder::expiry) implementation.
//! - **Plumbing**: clock, executor, statistics recorder, deletion
//!   listeners, tiebreak seed.
//!
//! [`build`](Builder::build) panics on an invalid combination;
//! [`try_build`](Builder::try_build) reports it as a [`ConfigError`].
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use brimcache::Builder;
//!
//! let cache = Builder::new()
//!     .maximum_weight(64 * 1024 * 1024)
//!     .weigher(|_key: &String, value: &Vec<u8>| value.len() as u32)
//!     .expire_after_write(Duration::from_secs(600))
//!     .build();
//!
//! cache.set("blob".to_string(), vec![0u8; 1024]);
//! assert!(cache.is_weighted());
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, Inner, InnerConfig, Weigher};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::event::{default_executor, DeletionEvent, Executor};
use crate::expiry::{Expiry, ExpiryPolicy};
use crate::stats::{NoopStats, StatsRecorder};

/// Default seed for the eviction tiebreaker RNG.
const DEFAULT_TIEBREAK_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Configures and constructs a [`Cache`].
pub struct Builder<K, V> {
    maximum_size: Option<u64>,
    maximum_weight: Option<u64>,
    weigher: Option<Weigher<K, V>>,
    initial_capacity: Option<usize>,
    expiry: Option<ExpiryPolicy<K, V>>,
    clock: Option<Arc<dyn Clock>>,
    executor: Option<Executor>,
    stats: Option<Arc<dyn StatsRecorder>>,
    on_deletion: Option<Arc<dyn Fn(DeletionEvent<K, V>) + Send + Sync>>,
    on_atomic_deletion: Option<Arc<dyn Fn(DeletionEvent<K, V>) + Send + Sync>>,
    tiebreak_seed: u64,
}

impl<K, V> Default for Builder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Builder<K, V> {
    /// Creates a builder for an unbounded cache with no expiration.
    pub fn new() -> Self {
        Self {
            maximum_size: None,
            maximum_weight: None,
            weigher: None,
            initial_capacity: None,
            expiry: None,
            clock: None,
            executor: None,
            stats: None,
            on_deletion: None,
            on_atomic_deletion: None,
            tiebreak_seed: DEFAULT_TIEBREAK_SEED,
        }
    }

    /// Bounds the cache by entry count. Mutually exclusive with
    /// [`maximum_weight`](Builder::maximum_weight).
    pub fn maximum_size(mut self, maximum: u64) -> Self {
        self.maximum_size = Some(maximum);
        self
    }

    /// Bounds the cache by summed entry weight; requires a
    /// [`weigher`](Builder::weigher).
    pub fn maximum_weight(mut self, maximum: u64) -> Self {
        self.maximum_weight = Some(maximum);
        self
    }

    /// Computes each entry's weight at write time. Weight zero pins the
    /// entry: it is never selected as an eviction victim. The weigher runs
    /// under a shard lock and must not call back into the cache.
    pub fn weigher(mut self, weigher: impl Fn(&K, &V) -> u32 + Send + Sync + 'static) -> Self {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    /// Sizing hint for the index.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Expires entries a fixed duration after their last write.
    pub fn expire_after_write(mut self, duration: Duration) -> Self {
        self.expiry = Some(ExpiryPolicy::FixedWrite(duration));
        self
    }

    /// Expires entries a fixed duration after creation; overwrites inherit
    /// the predecessor's deadline.
    pub fn expire_after_create(mut self, duration: Duration) -> Self {
        self.expiry = Some(ExpiryPolicy::FixedCreate(duration));
        self
    }

    /// Expires entries a fixed duration after their last read or write.
    pub fn expire_after_access(mut self, duration: Duration) -> Self {
        self.expiry = Some(ExpiryPolicy::FixedAccess(duration));
        self
    }

    /// Computes per-entry lifetimes through an [`Expiry`] implementation,
    /// tracked by the hierarchical timer wheel.
    pub fn expiry(mut self, expiry: impl Expiry<K, V>) -> Self {
        self.expiry = Some(ExpiryPolicy::Variable(Arc::new(expiry)));
        self
    }

    /// Injects the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Runs deletion notifications and deferred maintenance. Defaults to a
    /// short-lived thread per job; tests usually inject an inline executor.
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Attaches a statistics recorder. Defaults to [`NoopStats`].
    pub fn stats(mut self, stats: Arc<dyn StatsRecorder>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Listener for retired entries, delivered asynchronously on the
    /// executor with exactly one event per retired entry.
    pub fn on_deletion(
        mut self,
        listener: impl Fn(DeletionEvent<K, V>) + Send + Sync + 'static,
    ) -> Self {
        self.on_deletion = Some(Arc::new(listener));
        self
    }

    /// Listener fired synchronously under the shard lock, before the removal
    /// becomes observable. Must not call back into the cache.
    pub fn on_atomic_deletion(
        mut self,
        listener: impl Fn(DeletionEvent<K, V>) + Send + Sync + 'static,
    ) -> Self {
        self.on_atomic_deletion = Some(Arc::new(listener));
        self
    }

    /// Seeds the eviction tiebreaker RNG, for deterministic tests.
    pub fn tiebreak_seed(mut self, seed: u64) -> Self {
        self.tiebreak_seed = seed;
        self
    }
}

impl<K, V> Builder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds the cache.
    ///
    /// # Panics
    ///
    /// Panics on an invalid option combination; see
    /// [`try_build`](Builder::try_build) for the fallible variant.
    pub fn build(self) -> Cache<K, V> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(error) => panic!("invalid cache configuration: {error}"),
        }
    }

    /// Builds the cache, reporting invalid configurations as errors.
    pub fn try_build(self) -> Result<Cache<K, V>, ConfigError> {
        if self.maximum_size.is_some() && self.maximum_weight.is_some() {
            return Err(ConfigError::new(
                "maximum_size and maximum_weight are mutually exclusive",
            ));
        }
        if self.maximum_weight.is_some() && self.weigher.is_none() {
            return Err(ConfigError::new("maximum_weight requires a weigher"));
        }
        if self.weigher.is_some() && self.maximum_weight.is_none() {
            return Err(ConfigError::new("a weigher requires maximum_weight"));
        }
        let maximum = self.maximum_size.or(self.maximum_weight);
        if maximum == Some(0) {
            return Err(ConfigError::new("maximum must be greater than zero"));
        }

        let weighted = self.maximum_weight.is_some();
        let recording_stats = self.stats.is_some();
        let config = InnerConfig {
            maximum,
            weighted,
            initial_capacity: self.initial_capacity.unwrap_or(16),
            expiry: self.expiry.unwrap_or(ExpiryPolicy::None),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            weigher: self.weigher,
            stats: self.stats.unwrap_or_else(|| Arc::new(NoopStats)),
            recording_stats,
            executor: self.executor.unwrap_or_else(default_executor),
            on_deletion: self.on_deletion,
            on_atomic_deletion: self.on_atomic_deletion,
            tiebreak_seed: self.tiebreak_seed,
        };
        Ok(Cache::from_inner(Inner::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_an_unbounded_cache() {
        let cache: Cache<u64, u64> = Builder::new().build();
        assert_eq!(cache.maximum(), u64::MAX);
        assert!(!cache.is_weighted());
        assert!(!cache.is_recording_stats());
    }

    #[test]
    fn size_and_weight_are_mutually_exclusive() {
        let err = Builder::<u64, u64>::new()
            .maximum_size(10)
            .maximum_weight(10)
            .try_build()
            .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn weight_bound_requires_weigher() {
        let err = Builder::<u64, u64>::new()
            .maximum_weight(10)
            .try_build()
            .unwrap_err();
        assert!(err.to_string().contains("weigher"));
    }

    #[test]
    fn weigher_requires_weight_bound() {
        let err = Builder::<u64, u64>::new()
            .weigher(|_, _| 1)
            .try_build()
            .unwrap_err();
        assert!(err.to_string().contains("maximum_weight"));
    }

    #[test]
    fn zero_maximum_is_rejected() {
        let err = Builder::<u64, u64>::new().maximum_size(0).try_build().unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    #[should_panic(expected = "invalid cache configuration")]
    fn build_panics_on_invalid_configuration() {
        let _ = Builder::<u64, u64>::new().maximum_size(0).build();
    }

    #[test]
    fn recording_stats_reflects_attachment() {
        let cache: Cache<u64, u64> = Builder::new()
            .stats(Arc::new(crate::stats::StatsCounter::new()))
            .build();
        assert!(cache.is_recording_stats());
    }
}
