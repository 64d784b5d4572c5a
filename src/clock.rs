//! Injectable monotonic time source.
//!
//! Every timestamp inside the cache is an `i64` nanosecond offset read from a
//! [`Clock`]. Production caches use [`SystemClock`]; tests inject a
//! [`ManualClock`] and advance it explicitly so expiration becomes
//! deterministic.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use brimcache::{Builder, ManualClock};
//!
//! let clock = Arc::new(ManualClock::new());
//! let cache = Builder::new()
//!     .maximum_size(10)
//!     .expire_after_write(Duration::from_secs(1))
//!     .clock(clock.clone())
//!     .build();
//!
//! cache.set(1u64, "v");
//! clock.advance(Duration::from_secs(2));
//! cache.clean_up();
//! assert_eq!(cache.get_if_present(&1), None);
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source measured in nanoseconds.
///
/// The origin is arbitrary; only differences matter. Implementations must be
/// monotone non-decreasing, otherwise timer-wheel advancement misbehaves.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time in nanoseconds since an arbitrary origin.
    fn now(&self) -> i64;
}

/// Default clock backed by [`Instant`].
///
/// The origin is fixed at construction, so readings are always non-negative
/// and unaffected by wall-clock adjustments.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> i64 {
        // A saturating cast keeps extremely long uptimes from wrapping.
        self.origin.elapsed().as_nanos().min(i64::MAX as u128) as i64
    }
}

/// Manually advanced clock for tests.
///
/// Starts at zero and only moves when [`advance`](ManualClock::advance) is
/// called, which makes expiration scenarios fully deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let nanos = duration.as_nanos().min(i64::MAX as u128) as i64;
        self.now.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotone() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0);
    }

    #[test]
    fn manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now(), 3_000_000_000);
        clock.advance(Duration::from_nanos(7));
        assert_eq!(clock.now(), 3_000_000_007);
    }
}
