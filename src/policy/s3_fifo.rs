//! S3-FIFO admission and eviction policy.
//!
//! Three cooperating structures decide which entries stay cached:
//!
//! ```text
//!   SMALL QUEUE (≈10% of capacity)        MAIN QUEUE (remainder)
//!   ┌──────────────────────────┐          ┌──────────────────────────┐
//!   │ head                tail │          │ head                tail │
//!   │ [new] ◄──► ... ◄──► [old]│          │ [hot] ◄──► ... ◄──► [cold]
//!   │  ▲        sketch ≥ 2 ────┼─────────►│  ▲        freq ≥ 1 ──┐   │
//!   │  │        else: evict +  │          │  │  (reinsert, freq−1)   │
//!   │ insert    ghost-record   │          │  └───────────────────┘   │
//!   └──────────────────────────┘          └──────────────────────────┘
//!
//!   GHOST RING (fingerprints of entries evicted from Small)
//!   ┌──────────────────────────────────────────────────────┐
//!   │ re-inserted key with ghost hit → admitted into Main  │
//!   └──────────────────────────────────────────────────────┘
//! ```
//!
//! One-hit wonders drain out of Small quickly without disturbing Main, which
//! is what buys scan resistance; the ghost ring rescues keys that were
//! evicted too eagerly. The count-min sketch arbitrates Small-queue
//! promotion, the per-entry 2-bit frequency snapshot arbitrates Main-queue
//! reinsertion.
//!
//! Capacities are compared against **summed weights**, not entry counts, so
//! the same code serves size-bounded (weight 1 each) and weight-bounded
//! caches. Pinned entries (weight 0) are never selected as victims: a
//! pinned Small tail is promoted, a pinned Main tail rotates back to the
//! head.
//!
//! The policy is single-threaded state owned by the maintenance pass; every
//! method here is called under the maintenance lock.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ds::arena::{LinkArena, NIL};
use crate::ds::deque::Deque;
use crate::ds::ghost::GhostRing;
use crate::ds::sketch::FrequencySketch;
use crate::entry::{EntryRef, QueueTag};

/// Share of the capacity given to the Small queue.
const SMALL_SHARE: u64 = 10; // divisor, i.e. 10%

/// How many equally cold tail candidates the tiebreaker considers.
const TIEBREAK_WINDOW: usize = 3;

/// Ghost ring entries are just fingerprints, but an enormous weight bound
/// should still not translate into an unbounded ring.
const MAX_GHOST_ENTRIES: usize = 1 << 20;

/// Outcome of one eviction step, used to prove the pass terminates.
#[derive(Clone, Copy, PartialEq, Eq)]
enum EvictStep {
    /// Weight, queue length, or summed frequency went down.
    Progress,
    /// A pinned tail rotated to the head; nothing changed.
    Rotation,
    /// The targeted queue had nothing to offer.
    Stalled,
}

/// S3-FIFO policy state: queues, ghost ring, sketch, and weight accounting.
pub(crate) struct S3FifoPolicy<K, V> {
    arena: LinkArena<EntryRef<K, V>>,
    small: Deque,
    main: Deque,
    ghost: GhostRing,
    sketch: FrequencySketch,
    rng: SmallRng,
    /// Total weight bound; `u64::MAX` disables eviction entirely.
    maximum: u64,
    small_max: u64,
    small_weight: u64,
    main_weight: u64,
}

impl<K, V> S3FifoPolicy<K, V> {
    /// Creates the policy for the given weight bound. `None` builds an
    /// unbounded policy that links nothing and never evicts.
    pub(crate) fn new(maximum: Option<u64>, tiebreak_seed: u64) -> Self {
        let mut arena = LinkArena::new();
        let small = Deque::new(&mut arena);
        let main = Deque::new(&mut arena);
        let (maximum, small_max, ghost_cap, sketch_cap) = match maximum {
            Some(max) => {
                let small_max = (max / SMALL_SHARE).max(1);
                let ghost_cap = (max.saturating_sub(small_max)).max(1).min(MAX_GHOST_ENTRIES as u64);
                (max, small_max, ghost_cap as usize, max)
            }
            None => (u64::MAX, u64::MAX, 0, 0),
        };
        Self {
            arena,
            small,
            main,
            ghost: GhostRing::new(ghost_cap),
            sketch: FrequencySketch::new(sketch_cap),
            rng: SmallRng::seed_from_u64(tiebreak_seed),
            maximum,
            small_max,
            small_weight: 0,
            main_weight: 0,
        }
    }

    #[inline]
    pub(crate) fn is_bounded(&self) -> bool {
        self.maximum != u64::MAX
    }

    /// Summed weight of both queues.
    #[inline]
    pub(crate) fn weighted_size(&self) -> u64 {
        self.small_weight + self.main_weight
    }

    #[cfg(test)]
    pub(crate) fn small_len(&self) -> usize {
        self.small.len()
    }

    #[cfg(test)]
    pub(crate) fn main_len(&self) -> usize {
        self.main.len()
    }

    /// Records a drained read: bumps the sketch and the entry's snapshot,
    /// and nudges Main entries toward the head so reinsertion scans see hot
    /// entries last.
    pub(crate) fn record_access(&mut self, entry: &EntryRef<K, V>) {
        if !self.is_bounded() {
            return;
        }
        self.sketch.increment(entry.fingerprint());
        entry.bump_freq();
        let node = entry.policy_node();
        if entry.state() == QueueTag::Main && node != NIL {
            self.main.move_to_front(&mut self.arena, node);
        }
    }

    /// Admits a freshly added entry: Main on a ghost hit, Small otherwise.
    pub(crate) fn on_add(&mut self, entry: &EntryRef<K, V>) {
        if !self.is_bounded() {
            return;
        }
        debug_assert_eq!(entry.policy_node(), NIL);
        // The write itself counts as one use for admission purposes.
        self.sketch.increment(entry.fingerprint());
        let weight = u64::from(entry.weight());
        if self.ghost.remove(entry.fingerprint()) {
            let node = self.main.push_front(&mut self.arena, entry.clone());
            entry.set_policy_node(node);
            entry.set_state(QueueTag::Main);
            self.main_weight += weight;
        } else {
            let node = self.small.push_front(&mut self.arena, entry.clone());
            entry.set_policy_node(node);
            entry.set_state(QueueTag::Small);
            self.small_weight += weight;
        }
    }

    /// Replaces `old` with `new` at the predecessor's queue position, so an
    /// overwrite neither resets nor advances the key's FIFO age. When the
    /// predecessor was never linked (buffered tasks can arrive reordered),
    /// the replacement goes through normal admission instead.
    pub(crate) fn on_replace(&mut self, old: &EntryRef<K, V>, new: &EntryRef<K, V>) {
        if !self.is_bounded() {
            return;
        }
        let old_node = old.policy_node();
        if old_node == NIL {
            if new.is_alive() {
                self.on_add(new);
            }
            return;
        }
        let tag = old.state();
        if new.is_alive() {
            new.set_freq(old.freq());
            let deque = match tag {
                QueueTag::Main => &mut self.main,
                _ => &mut self.small,
            };
            let node = deque.insert_before(&mut self.arena, old_node, new.clone());
            new.set_policy_node(node);
            new.set_state(tag);
            match tag {
                QueueTag::Main => self.main_weight += u64::from(new.weight()),
                _ => self.small_weight += u64::from(new.weight()),
            }
        }
        self.unlink(old);
    }

    /// Unlinks an entry from whichever queue holds it. Safe to call for
    /// entries that were never linked.
    pub(crate) fn unlink(&mut self, entry: &EntryRef<K, V>) {
        let node = entry.policy_node();
        if node == NIL {
            return;
        }
        let weight = u64::from(entry.weight());
        match entry.state() {
            QueueTag::Small => {
                let _ = self.small.unlink(&mut self.arena, node);
                self.small_weight -= weight;
            }
            QueueTag::Main => {
                let _ = self.main.unlink(&mut self.arena, node);
                self.main_weight -= weight;
            }
            QueueTag::Unassigned => {}
        }
        entry.set_policy_node(NIL);
        entry.set_state(QueueTag::Unassigned);
    }

    /// Applies a new weight bound. The caller runs [`evict`](Self::evict)
    /// afterwards to shed any excess.
    pub(crate) fn resize(&mut self, maximum: u64) {
        if !self.is_bounded() {
            return;
        }
        self.maximum = maximum;
        self.small_max = (maximum / SMALL_SHARE).max(1);
        let ghost_cap = maximum
            .saturating_sub(self.small_max)
            .max(1)
            .min(MAX_GHOST_ENTRIES as u64);
        self.ghost.set_capacity(ghost_cap as usize);
    }

    /// Evicts until the summed weight fits the bound, calling `retire` for
    /// each victim after unlinking it.
    ///
    /// Every step except a pinned-tail rotation is monotone progress: it
    /// removes weight, shrinks a queue, or decrements a bounded frequency
    /// counter. Pinned rotations carry no weight, so more of them in a row
    /// than Main has entries means nothing left is evictable and the pass
    /// stops rather than cycling the queue.
    pub(crate) fn evict(&mut self, mut retire: impl FnMut(&EntryRef<K, V>)) {
        if !self.is_bounded() {
            return;
        }
        let mut rotations = 0usize;
        while self.weighted_size() > self.maximum {
            let step = if self.small_weight > self.small_max && !self.small.is_empty() {
                self.evict_from_small(&mut retire)
            } else if !self.main.is_empty() {
                self.evict_from_main(&mut retire)
            } else if !self.small.is_empty() {
                self.evict_from_small(&mut retire)
            } else {
                EvictStep::Stalled
            };
            match step {
                EvictStep::Progress => rotations = 0,
                EvictStep::Rotation => {
                    rotations += 1;
                    if rotations > self.main.len() {
                        break;
                    }
                }
                EvictStep::Stalled => break,
            }
        }
    }

    /// One Small-queue step: drop dead tails, promote pinned or re-accessed
    /// tails into Main, otherwise ghost-record and retire the tail. Always
    /// progress: the Small queue shrinks by one entry either way.
    fn evict_from_small(&mut self, retire: &mut impl FnMut(&EntryRef<K, V>)) -> EvictStep {
        let Some(tail) = self.small.back(&self.arena) else {
            return EvictStep::Stalled;
        };
        let Some(entry) = self.arena.value(tail).cloned() else {
            return EvictStep::Stalled;
        };
        if !entry.is_alive() {
            // Its task still sits in the write buffer; unlink only.
            self.unlink(&entry);
            return EvictStep::Progress;
        }
        let weight = u64::from(entry.weight());
        if entry.is_pinned() || self.sketch.frequency(entry.fingerprint()) >= 2 {
            let _ = self.small.unlink(&mut self.arena, tail);
            self.small_weight -= weight;
            let node = self.main.push_front(&mut self.arena, entry.clone());
            entry.set_policy_node(node);
            entry.set_state(QueueTag::Main);
            entry.set_freq(0);
            self.main_weight += weight;
            return EvictStep::Progress;
        }
        self.ghost.record(entry.fingerprint());
        self.unlink(&entry);
        retire(&entry);
        EvictStep::Progress
    }

    /// One Main-queue step: rotate pinned or recently-read tails back to the
    /// head, otherwise retire one of the equally cold tail candidates picked
    /// by the seeded tiebreaker. A frequency-decrementing rotation still
    /// counts as progress (the summed frequency only ever goes down); only
    /// the pinned rotation leaves the accounting untouched.
    fn evict_from_main(&mut self, retire: &mut impl FnMut(&EntryRef<K, V>)) -> EvictStep {
        let Some(tail) = self.main.back(&self.arena) else {
            return EvictStep::Stalled;
        };
        let Some(entry) = self.arena.value(tail).cloned() else {
            return EvictStep::Stalled;
        };
        if !entry.is_alive() {
            self.unlink(&entry);
            return EvictStep::Progress;
        }
        if entry.is_pinned() {
            self.main.move_to_front(&mut self.arena, tail);
            return EvictStep::Rotation;
        }
        let freq = entry.freq();
        if freq > 0 {
            entry.set_freq(freq - 1);
            self.main.move_to_front(&mut self.arena, tail);
            return EvictStep::Progress;
        }

        // Collect the run of equally cold candidates at the tail and let the
        // seeded RNG pick, so workloads cannot depend on exact FIFO age when
        // several victims are indistinguishable.
        let mut candidates = vec![tail];
        let mut cursor = tail;
        while candidates.len() < TIEBREAK_WINDOW {
            let Some(prev) = self.main.prev_in(&self.arena, cursor) else {
                break;
            };
            let qualifies = self
                .arena
                .value(prev)
                .is_some_and(|e| e.is_alive() && !e.is_pinned() && e.freq() == 0);
            if !qualifies {
                break;
            }
            candidates.push(prev);
            cursor = prev;
        }
        let pick = if candidates.len() > 1 {
            self.rng.gen_range(0..candidates.len())
        } else {
            0
        };
        let Some(victim) = self.arena.value(candidates[pick]).cloned() else {
            return EvictStep::Stalled;
        };
        self.unlink(&victim);
        retire(&victim);
        EvictStep::Progress
    }
}
