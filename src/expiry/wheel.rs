//! Hierarchical timer wheel for variable expiration.
//!
//! Five levels of power-of-two tick spans hold entries hashed by deadline.
//! An entry lands in the coarsest level whose span still resolves its
//! remaining lifetime; advancing the wheel drains every bucket the clock has
//! crossed, expiring due entries and cascading the rest down to finer
//! levels. All bucket operations are O(1) against the shared link arena.
//!
//! ## Geometry
//!
//! ```text
//!  level | tick span | buckets | covers up to
//!  ------|-----------|---------|--------------
//!    0   |  ~1.07 s  |   64    |  ~68.7 s
//!    1   |  ~68.7 s  |   64    |  ~1 h 13 m
//!    2   |  ~1.22 h  |   32    |  ~1 d 15 h
//!    3   |  ~1.63 d  |    4    |  ~6 d 12 h
//!    4   |  ~6.51 d  |    1    |  everything else
//!
//!  bucket(level, deadline) = (deadline >> SHIFT[level]) & (BUCKETS[level] - 1)
//! ```
//!
//! Tick spans are powers of two so bucket selection is a shift and a mask;
//! each level's coverage equals the next level's tick span. Expiry is
//! granular: an entry may outlive its deadline by at most one tick of the
//! level it sits in, never past the next advance that crosses its bucket.

use crate::ds::arena::{LinkArena, NIL};
use crate::entry::EntryRef;

const LEVELS: usize = 5;

/// log2 of each level's tick span in nanoseconds.
const SHIFT: [u32; LEVELS] = [30, 36, 42, 47, 49];

/// Buckets per level.
const BUCKETS: [usize; LEVELS] = [64, 64, 32, 4, 1];

/// Hierarchical timer wheel over sentinel-rooted bucket lists.
pub(crate) struct TimerWheel<K, V> {
    arena: LinkArena<EntryRef<K, V>>,
    /// `buckets[level][index]` is the sentinel of that bucket's list.
    buckets: Vec<Vec<u32>>,
    /// Wheel-local current time in nanoseconds.
    time: u64,
    len: usize,
}

impl<K, V> TimerWheel<K, V> {
    pub(crate) fn new(now: u64) -> Self {
        let sentinels: usize = BUCKETS.iter().sum();
        let mut arena = LinkArena::with_capacity(sentinels);
        let buckets = BUCKETS
            .iter()
            .map(|&count| (0..count).map(|_| arena.new_list()).collect())
            .collect();
        Self {
            arena,
            buckets,
            time: now,
            len: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Links an entry into the bucket matching its deadline.
    pub(crate) fn add(&mut self, entry: EntryRef<K, V>) {
        debug_assert_eq!(entry.timer_node(), NIL);
        let deadline = entry.expires_at().max(0) as u64;
        let sentinel = self.sentinel_for(deadline);
        let node = self.arena.link_before(sentinel, entry.clone());
        entry.set_timer_node(node);
        self.len += 1;
    }

    /// Unlinks an entry, tolerating entries that were never linked.
    pub(crate) fn remove(&mut self, entry: &EntryRef<K, V>) {
        let node = entry.timer_node();
        if node == NIL {
            return;
        }
        if self.arena.unlink(node).is_some() {
            self.len -= 1;
        }
        entry.set_timer_node(NIL);
    }

    /// Picks the bucket for a deadline: the coarsest level whose coverage
    /// still contains the remaining duration, the top level otherwise.
    fn sentinel_for(&self, deadline: u64) -> u32 {
        let duration = deadline.saturating_sub(self.time);
        for level in 0..LEVELS - 1 {
            if duration < (BUCKETS[level] as u64) << SHIFT[level] {
                return self.bucket_at(level, deadline);
            }
        }
        self.bucket_at(LEVELS - 1, deadline)
    }

    #[inline]
    fn bucket_at(&self, level: usize, deadline: u64) -> u32 {
        let ticks = deadline >> SHIFT[level];
        self.buckets[level][(ticks as usize) & (BUCKETS[level] - 1)]
    }

    /// Advances wheel time to `now`, expiring every due entry (earliest
    /// buckets first) and cascading the rest toward finer levels.
    ///
    /// For each level the crossed tick range is processed inclusively of the
    /// current tick, because the bucket the clock now sits in may hold
    /// entries that are already due. Crossing more ticks than a level has
    /// buckets degenerates into a full sweep of that level.
    pub(crate) fn advance(&mut self, now: u64, mut expire: impl FnMut(EntryRef<K, V>)) {
        if now < self.time {
            return;
        }
        if self.len == 0 {
            self.time = now;
            return;
        }
        let prev = self.time;
        self.time = now;

        let mut pending: Vec<EntryRef<K, V>> = Vec::new();
        for level in 0..LEVELS {
            let prev_ticks = prev >> SHIFT[level];
            let current_ticks = now >> SHIFT[level];
            if current_ticks <= prev_ticks {
                break;
            }
            let delta = current_ticks - prev_ticks;
            let steps = (delta + 1).min(BUCKETS[level] as u64);
            for tick in prev_ticks..prev_ticks + steps {
                let sentinel = self.buckets[level][(tick as usize) & (BUCKETS[level] - 1)];
                // Empty the bucket before deciding each entry's fate, so a
                // not-yet-due entry relinked into this same bucket cannot be
                // drained twice.
                loop {
                    let node = self.arena.next_of(sentinel);
                    if node == sentinel {
                        break;
                    }
                    if let Some(entry) = self.arena.unlink(node) {
                        entry.set_timer_node(NIL);
                        self.len -= 1;
                        pending.push(entry);
                    }
                }
            }
        }

        for entry in pending {
            let deadline = entry.expires_at().max(0) as u64;
            if deadline <= now {
                expire(entry);
            } else {
                self.add(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use std::sync::Arc;

    const SECOND: u64 = 1_000_000_000;

    fn entry(key: u64, expires_at: u64) -> EntryRef<u64, u64> {
        Arc::new(Entry::new(key, key, key, 1, expires_at as i64))
    }

    fn level_of(wheel: &TimerWheel<u64, u64>, deadline: u64) -> usize {
        let sentinel = wheel.sentinel_for(deadline);
        wheel
            .buckets
            .iter()
            .position(|level| level.contains(&sentinel))
            .unwrap()
    }

    #[test]
    fn deadlines_land_in_expected_levels() {
        let wheel: TimerWheel<u64, u64> = TimerWheel::new(0);
        assert_eq!(level_of(&wheel, SECOND), 0);
        assert_eq!(level_of(&wheel, 69 * SECOND), 1);
        assert_eq!(level_of(&wheel, 4_399 * SECOND), 2);
        assert_eq!(level_of(&wheel, 200_000 * SECOND), 3);
        assert_eq!(level_of(&wheel, 1_420_000 * SECOND), 4);
    }

    #[test]
    fn advance_expires_in_deadline_order() {
        let mut wheel = TimerWheel::new(0);
        let deadlines: [(u64, u64); 7] = [
            (1, SECOND),
            (2, 10 * SECOND),
            (3, 30 * SECOND),
            (4, 120 * SECOND),
            (5, 6_500 * SECOND),
            (6, 142_000 * SECOND),
            (7, 1_420_000 * SECOND),
        ];
        for (key, deadline) in deadlines {
            wheel.add(entry(key, deadline));
        }
        assert_eq!(wheel.len(), 7);

        let mut expired = Vec::new();
        let checkpoints: [(u64, &[u64]); 6] = [
            (2 * SECOND, &[1]),
            (64 * SECOND, &[1, 2, 3]),
            (121 * SECOND, &[1, 2, 3, 4]),
            (12_000 * SECOND, &[1, 2, 3, 4, 5]),
            (350_000 * SECOND, &[1, 2, 3, 4, 5, 6]),
            (1_520_000 * SECOND, &[1, 2, 3, 4, 5, 6, 7]),
        ];
        for (now, want) in checkpoints {
            wheel.advance(now, |e| expired.push(*e.key()));
            assert_eq!(expired, want, "unexpected expiry set at t={}s", now / SECOND);
        }
        assert_eq!(wheel.len(), 0);
    }

    #[test]
    fn remove_prevents_expiry() {
        let mut wheel = TimerWheel::new(0);
        let e = entry(1, SECOND);
        wheel.add(e.clone());
        wheel.remove(&e);
        assert_eq!(e.timer_node(), NIL);

        let mut expired = Vec::new();
        wheel.advance(5 * SECOND, |e| expired.push(*e.key()));
        assert!(expired.is_empty());
    }

    #[test]
    fn long_deadline_cascades_instead_of_expiring() {
        let mut wheel = TimerWheel::new(0);
        // Lives in level 1, but only a fraction of it has elapsed.
        wheel.add(entry(1, 100 * SECOND));

        let mut expired = Vec::new();
        wheel.advance(90 * SECOND, |e| expired.push(*e.key()));
        assert!(expired.is_empty());
        assert_eq!(wheel.len(), 1);

        wheel.advance(101 * SECOND, |e| expired.push(*e.key()));
        assert_eq!(expired, vec![1]);
    }

    #[test]
    fn backwards_time_is_ignored() {
        let mut wheel = TimerWheel::new(10 * SECOND);
        wheel.add(entry(1, 11 * SECOND));
        wheel.advance(SECOND, |_| panic!("nothing can be due"));
        assert_eq!(wheel.len(), 1);
    }
}
