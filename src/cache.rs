//! Concurrent bounded cache: facade, write paths, and maintenance loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            Cache<K, V>                               │
//! │                                                                      │
//! │  reads                          writes                               │
//! │    │                              │                                  │
//! │    ▼                              ▼                                  │
//! │  ┌─────────────────┐   ┌────────────────────────────┐                │
//! │  │ sharded index   │   │ sharded index (write lock) │                │
//! │  │ (read lock)     │   │ swap entry, kill old,      │                │
//! │  └───────┬─────────┘   │ atomic deletion listener   │                │
//! │          │             └──────────┬─────────────────┘                │
//! │          ▼                        ▼                                  │
//! │  ┌─────────────────┐   ┌────────────────────────────┐                │
//! │  │ striped read    │   │ bounded write buffer       │                │
//! │  │ buffer (lossy)  │   │ (MPSC, backpressure)       │                │
//! │  └───────┬─────────┘   └──────────┬─────────────────┘                │
//! │          └───────────┬────────────┘                                  │
//! │                      ▼                                               │
//! │      ┌────────────────────────────────────┐   single writer,        │
//! │      │          maintenance pass          │   guarded by the        │
//! │      │ 1. drain read buffer → sketch/freq │   policy mutex          │
//! │      │ 2. drain write buffer → queues     │                         │
//! │      │ 3. expire due entries              │                         │
//! │      │ 4. enforce capacity (S3-FIFO)      │                         │
//! │      └──────────────────┬─────────────────┘                         │
//! │                         ▼                                           │
//! │          deletion events → user executor                            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writers mutate only the index on their own thread and describe the
//! mutation in a task; the maintenance pass replays tasks against the policy
//! and timer structures under a single lock. A full write buffer makes the
//! writer run that pass inline, so policy state is never dropped.
//!
//! ## Locking discipline
//!
//! - Shard locks are held only for a single key's mutation, including the
//!   user compute closure and the atomic deletion listener.
//! - The policy mutex may acquire shard locks (eviction, expiration), never
//!   the other way around. No thread submits tasks while holding a shard
//!   lock.
//! - Asynchronous deletion events are dispatched after the policy mutex is
//!   released.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::ds::read_buffer::ReadBuffer;
use crate::ds::write_buffer::WriteBuffer;
use crate::entry::{Entry, EntryRef};
use crate::event::{DeletionCause, DeletionEvent, Executor, Listener};
use crate::expiry::{ExpiryPolicy, TimerState};
use crate::index::{Index, IndexOp};
use crate::policy::s3_fifo::S3FifoPolicy;
use crate::stats::StatsRecorder;

/// Weighing function for weight-bounded caches. Weight zero pins an entry.
pub(crate) type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>;

/// Mutation selected by a [`compute`](Cache::compute) closure.
#[derive(Debug)]
pub enum ComputeOp<V> {
    /// Leave the cache unchanged.
    Cancel,
    /// Insert or replace the entry with this value.
    Write(V),
    /// Remove the entry if present.
    Invalidate,
}

/// Policy task describing an index mutation for the maintenance pass.
enum Task<K, V> {
    /// A fresh entry was inserted.
    Add(EntryRef<K, V>),
    /// A compute overwrote `old` with `new`.
    Update {
        new: EntryRef<K, V>,
        old: EntryRef<K, V>,
        old_cause: DeletionCause,
    },
    /// A `set` overwrote `old` with `new`.
    Replace {
        new: EntryRef<K, V>,
        old: EntryRef<K, V>,
        old_cause: DeletionCause,
    },
    /// An entry was removed explicitly.
    Invalidate {
        entry: EntryRef<K, V>,
        cause: DeletionCause,
    },
    /// A read found the entry past its deadline and removed it.
    Expire(EntryRef<K, V>),
    /// The maximum changed.
    Resize(u64),
}

/// Maintenance-owned state: the eviction policy plus the timer structure.
struct PolicyCore<K, V> {
    s3: S3FifoPolicy<K, V>,
    timer: TimerState<K, V>,
}

/// Drain-status values for single-flight maintenance scheduling.
const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const RUNNING: u8 = 2;
const RERUN: u8 = 3;

pub(crate) struct Inner<K, V> {
    index: Index<K, V>,
    policy: Mutex<PolicyCore<K, V>>,
    read_buffer: ReadBuffer<EntryRef<K, V>>,
    write_buffer: WriteBuffer<Task<K, V>>,
    hasher: RandomState,
    clock: Arc<dyn Clock>,
    expiry: ExpiryPolicy<K, V>,
    weigher: Option<Weigher<K, V>>,
    stats: Arc<dyn StatsRecorder>,
    recording_stats: bool,
    executor: Executor,
    on_deletion: Option<Listener<K, V>>,
    on_atomic_deletion: Option<Listener<K, V>>,
    /// Current weight bound; `u64::MAX` when unbounded.
    maximum: AtomicU64,
    bounded: bool,
    weighted: bool,
    /// Reads only need recording when a policy or timer consumes them.
    track_reads: bool,
    drain_status: AtomicU8,
    /// Back-reference for handing `Arc<Inner>` clones to the executor.
    self_ref: OnceLock<Weak<Inner<K, V>>>,
}

/// Everything the builder resolved, handed to [`Inner::new`].
pub(crate) struct InnerConfig<K, V> {
    pub maximum: Option<u64>,
    pub weighted: bool,
    pub initial_capacity: usize,
    pub expiry: ExpiryPolicy<K, V>,
    pub clock: Arc<dyn Clock>,
    pub weigher: Option<Weigher<K, V>>,
    pub stats: Arc<dyn StatsRecorder>,
    pub recording_stats: bool,
    pub executor: Executor,
    pub on_deletion: Option<Listener<K, V>>,
    pub on_atomic_deletion: Option<Listener<K, V>>,
    pub tiebreak_seed: u64,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(config: InnerConfig<K, V>) -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        let now = config.clock.now();
        let bounded = config.maximum.is_some();
        let track_reads = bounded || config.expiry.refreshes_on_access();
        Self {
            index: Index::new(config.initial_capacity),
            policy: Mutex::new(PolicyCore {
                s3: S3FifoPolicy::new(config.maximum, config.tiebreak_seed),
                timer: TimerState::for_policy(&config.expiry, now),
            }),
            read_buffer: ReadBuffer::new(parallelism),
            write_buffer: WriteBuffer::new((parallelism * 32).max(128)),
            hasher: RandomState::new(),
            clock: config.clock,
            expiry: config.expiry,
            weigher: config.weigher,
            stats: config.stats,
            recording_stats: config.recording_stats,
            executor: config.executor,
            on_deletion: config.on_deletion,
            on_atomic_deletion: config.on_atomic_deletion,
            maximum: AtomicU64::new(config.maximum.unwrap_or(u64::MAX)),
            bounded,
            weighted: config.weighted,
            track_reads,
            drain_status: AtomicU8::new(IDLE),
            self_ref: OnceLock::new(),
        }
    }

    #[inline]
    fn fingerprint(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    #[inline]
    fn weight_of(&self, key: &K, value: &V) -> u32 {
        match &self.weigher {
            Some(weigher) => weigher(key, value),
            None => 1,
        }
    }

    fn fire_atomic(&self, entry: &EntryRef<K, V>, cause: DeletionCause) {
        if let Some(listener) = &self.on_atomic_deletion {
            listener(DeletionEvent {
                key: entry.key().clone(),
                value: entry.value().clone(),
                cause,
            });
        }
    }

    fn collect_event(
        &self,
        events: &mut Vec<DeletionEvent<K, V>>,
        entry: &EntryRef<K, V>,
        cause: DeletionCause,
    ) {
        if self.on_deletion.is_some() {
            events.push(DeletionEvent {
                key: entry.key().clone(),
                value: entry.value().clone(),
                cause,
            });
        }
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Lookup with statistics, lazy expiration, and read recording.
    fn read(&self, key: &K) -> Option<EntryRef<K, V>> {
        let fingerprint = self.fingerprint(key);
        let Some(entry) = self.index.get(fingerprint, key) else {
            self.stats.record_misses(1);
            return None;
        };
        let now = self.clock.now();
        if entry.is_expired(now) {
            self.stats.record_misses(1);
            // Expired entries read as absent; retire eagerly instead of
            // waiting for the timer to cross the deadline.
            if self
                .index
                .remove_if_same(&entry, || self.fire_atomic(&entry, DeletionCause::Expiration))
            {
                self.submit(Task::Expire(entry.clone()));
            }
            return None;
        }
        self.stats.record_hits(1);
        if self.track_reads && !self.read_buffer.push(entry.clone()) {
            self.schedule_maintenance();
        }
        Some(entry)
    }

    // ------------------------------------------------------------------
    // Write paths
    // ------------------------------------------------------------------

    /// Shared `set` / `set_if_absent` implementation. Returns the previous
    /// live value, which for `set_if_absent` doubles as the "lost the race"
    /// signal.
    fn write(&self, key: K, value: V, only_if_absent: bool) -> Option<V> {
        let fingerprint = self.fingerprint(&key);
        let now = self.clock.now();
        let weight = self.weight_of(&key, &value);
        let mut task = None;
        let previous = self.index.compute(fingerprint, &key, |current| {
            match current {
                Some(old) if only_if_absent && !old.is_expired(now) => {
                    (IndexOp::Retain, Some(old.value().clone()))
                }
                Some(old) => {
                    let expired = old.is_expired(now);
                    let deadline = if expired {
                        self.expiry.deadline_on_create(&key, &value, now)
                    } else {
                        self.expiry
                            .deadline_on_update(&key, &value, now, old.expires_at())
                    };
                    let old_cause = if expired {
                        DeletionCause::Expiration
                    } else {
                        DeletionCause::Replacement
                    };
                    let entry = Arc::new(Entry::new(key.clone(), value, fingerprint, weight, deadline));
                    old.kill();
                    self.fire_atomic(old, old_cause);
                    task = Some(Task::Replace {
                        new: entry.clone(),
                        old: old.clone(),
                        old_cause,
                    });
                    let previous = (!expired).then(|| old.value().clone());
                    (IndexOp::Insert(entry), previous)
                }
                None => {
                    let deadline = self.expiry.deadline_on_create(&key, &value, now);
                    let entry = Arc::new(Entry::new(key.clone(), value, fingerprint, weight, deadline));
                    task = Some(Task::Add(entry.clone()));
                    (IndexOp::Insert(entry), None)
                }
            }
        });
        if let Some(task) = task {
            self.submit(task);
        }
        previous
    }

    /// Atomic read-modify-write. The user closure runs at most once, under
    /// the shard lock, and must not touch the cache.
    fn compute(&self, key: &K, f: impl FnOnce(Option<&V>) -> ComputeOp<V>) -> Option<V> {
        let fingerprint = self.fingerprint(key);
        let now = self.clock.now();
        let mut task = None;
        let result = self.index.compute(fingerprint, key, |current| {
            let live = current.filter(|entry| !entry.is_expired(now));
            let found = live.is_some();
            let op = f(live.map(|entry| entry.value()));
            let out = self.apply_compute_op(key, fingerprint, now, current, op, &mut task);
            // Counted only once the closure and the weigher have returned,
            // so a panicking call leaves the recorder untouched too.
            if found {
                self.stats.record_hits(1);
            } else {
                self.stats.record_misses(1);
            }
            out
        });
        if let Some(task) = task {
            self.submit(task);
        }
        result
    }

    /// Applies a [`ComputeOp`] inside the shard critical section; shared by
    /// the compute variants.
    fn apply_compute_op(
        &self,
        key: &K,
        fingerprint: u64,
        now: i64,
        current: Option<&EntryRef<K, V>>,
        op: ComputeOp<V>,
        task: &mut Option<Task<K, V>>,
    ) -> (IndexOp<K, V>, Option<V>) {
        let live = current.filter(|entry| !entry.is_expired(now));
        match op {
            ComputeOp::Cancel => (IndexOp::Retain, live.map(|entry| entry.value().clone())),
            ComputeOp::Write(value) => {
                let weight = self.weight_of(key, &value);
                let (deadline, old_cause) = match live {
                    Some(old) => (
                        self.expiry.deadline_on_update(key, &value, now, old.expires_at()),
                        DeletionCause::Replacement,
                    ),
                    None => (
                        self.expiry.deadline_on_create(key, &value, now),
                        DeletionCause::Expiration,
                    ),
                };
                let entry = Arc::new(Entry::new(key.clone(), value, fingerprint, weight, deadline));
                let result = Some(entry.value().clone());
                if let Some(old) = current {
                    old.kill();
                    self.fire_atomic(old, old_cause);
                    *task = Some(Task::Update {
                        new: entry.clone(),
                        old: old.clone(),
                        old_cause,
                    });
                } else {
                    *task = Some(Task::Add(entry.clone()));
                }
                (IndexOp::Insert(entry), result)
            }
            ComputeOp::Invalidate => match current {
                Some(old) => {
                    let cause = if old.is_expired(now) {
                        DeletionCause::Expiration
                    } else {
                        DeletionCause::Invalidation
                    };
                    old.kill();
                    self.fire_atomic(old, cause);
                    *task = Some(Task::Invalidate {
                        entry: old.clone(),
                        cause,
                    });
                    (IndexOp::Remove, None)
                }
                None => (IndexOp::Retain, None),
            },
        }
    }

    fn compute_if_absent(&self, key: &K, f: impl FnOnce() -> Option<V>) -> Option<V> {
        let fingerprint = self.fingerprint(key);
        // Fast path: a live entry means the closure must not run.
        if let Some(entry) = self.index.get(fingerprint, key) {
            if !entry.is_expired(self.clock.now()) {
                self.stats.record_hits(1);
                if self.track_reads && !self.read_buffer.push(entry.clone()) {
                    self.schedule_maintenance();
                }
                return Some(entry.value().clone());
            }
        }
        let now = self.clock.now();
        let mut task = None;
        let result = self.index.compute(fingerprint, key, |current| {
            let live = current.filter(|entry| !entry.is_expired(now));
            if let Some(entry) = live {
                // Lost the race to a concurrent writer.
                self.stats.record_hits(1);
                return (IndexOp::Retain, Some(entry.value().clone()));
            }
            // The miss is counted only once the closure and the weigher have
            // returned, so a panicking call leaves the recorder untouched.
            match f() {
                None => {
                    self.stats.record_misses(1);
                    (IndexOp::Retain, None)
                }
                Some(value) => {
                    let out = self.apply_compute_op(
                        key,
                        fingerprint,
                        now,
                        current,
                        ComputeOp::Write(value),
                        &mut task,
                    );
                    self.stats.record_misses(1);
                    out
                }
            }
        });
        if let Some(task) = task {
            self.submit(task);
        }
        result
    }

    fn compute_if_present(
        &self,
        key: &K,
        f: impl FnOnce(&V) -> ComputeOp<V>,
    ) -> Option<V> {
        let fingerprint = self.fingerprint(key);
        let now = self.clock.now();
        // Fast path: nothing to do, and the closure must not run.
        match self.index.get(fingerprint, key) {
            Some(entry) if !entry.is_expired(now) => {}
            _ => {
                self.stats.record_misses(1);
                return None;
            }
        }
        let mut task = None;
        let result = self.index.compute(fingerprint, key, |current| {
            let live = current.filter(|entry| !entry.is_expired(now));
            let Some(entry) = live else {
                // Vanished between the fast path and the lock.
                self.stats.record_misses(1);
                return (IndexOp::Retain, None);
            };
            let op = f(entry.value());
            let out = self.apply_compute_op(key, fingerprint, now, current, op, &mut task);
            // Counted only once the closure and the weigher have returned,
            // so a panicking call leaves the recorder untouched too.
            self.stats.record_hits(1);
            out
        });
        if let Some(task) = task {
            self.submit(task);
        }
        result
    }

    fn invalidate(&self, key: &K) -> Option<V> {
        let fingerprint = self.fingerprint(key);
        let now = self.clock.now();
        let mut task = None;
        let previous = self.index.compute(fingerprint, key, |current| match current {
            Some(old) => {
                let expired = old.is_expired(now);
                let cause = if expired {
                    DeletionCause::Expiration
                } else {
                    DeletionCause::Invalidation
                };
                old.kill();
                self.fire_atomic(old, cause);
                task = Some(Task::Invalidate {
                    entry: old.clone(),
                    cause,
                });
                (IndexOp::Remove, (!expired).then(|| old.value().clone()))
            }
            None => (IndexOp::Retain, None),
        });
        if let Some(task) = task {
            self.submit(task);
        }
        previous
    }

    fn invalidate_all(&self) {
        let removed = self
            .index
            .drain(|entry| self.fire_atomic(entry, DeletionCause::Invalidation));
        for entry in removed {
            self.submit(Task::Invalidate {
                entry,
                cause: DeletionCause::Invalidation,
            });
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Enqueues a task, running maintenance inline whenever the buffer
    /// pushes back or is half full. Never called under a shard lock.
    fn submit(&self, task: Task<K, V>) {
        let mut task = task;
        loop {
            match self.write_buffer.push(task) {
                Ok(()) => break,
                Err(rejected) => {
                    task = rejected;
                    self.maintain();
                }
            }
        }
        if self.write_buffer.should_drain() {
            self.maintain();
        } else {
            self.schedule_maintenance();
        }
    }

    /// Schedules a single-flight maintenance pass on the executor.
    fn schedule_maintenance(&self) {
        loop {
            match self.drain_status.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .drain_status
                        .compare_exchange(IDLE, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        let Some(inner) = self.self_ref.get().and_then(Weak::upgrade) else {
                            // Tearing down; nothing left to maintain.
                            self.drain_status.store(IDLE, Ordering::Release);
                            return;
                        };
                        (self.executor)(Box::new(move || inner.run_scheduled()));
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .drain_status
                        .compare_exchange(RUNNING, RERUN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn run_scheduled(&self) {
        self.drain_status.store(RUNNING, Ordering::Release);
        self.maintain();
        if self
            .drain_status
            .compare_exchange(RERUN, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.maintain();
        }
        self.drain_status.store(IDLE, Ordering::Release);
        if !self.write_buffer.is_empty() {
            self.schedule_maintenance();
        }
    }

    /// Runs one full maintenance pass and dispatches the deletion events it
    /// produced.
    pub(crate) fn maintain(&self) {
        let events = {
            let mut core = self.policy.lock();
            self.run_maintenance(&mut core)
        };
        self.dispatch_events(events);
    }

    fn run_maintenance(&self, core: &mut PolicyCore<K, V>) -> Vec<DeletionEvent<K, V>> {
        let mut events = Vec::new();
        let now = self.clock.now();

        // 1. Drain the read buffer: sketch and frequency updates, Main
        //    promotion, access-based deadline refresh.
        self.read_buffer.drain(|entry| {
            if !entry.is_alive() {
                return;
            }
            core.s3.record_access(&entry);
            if self.expiry.refreshes_on_access() && entry.has_deadline() {
                let deadline =
                    self.expiry
                        .deadline_on_read(entry.key(), entry.value(), now, entry.expires_at());
                if deadline != entry.expires_at() {
                    entry.set_expires_at(deadline);
                }
                core.timer.on_access(&entry);
            }
        });

        // 2. Drain the write buffer.
        while let Some(task) = self.write_buffer.pop() {
            self.apply_task(core, task, &mut events);
        }

        // 3. Expire due entries.
        {
            let PolicyCore { s3, timer } = &mut *core;
            timer.expire(now, |entry| {
                s3.unlink(&entry);
                if entry.is_alive()
                    && self.index.remove_if_same(&entry, || {
                        self.fire_atomic(&entry, DeletionCause::Expiration)
                    })
                {
                    self.stats.record_eviction(entry.weight());
                    self.collect_event(&mut events, &entry, DeletionCause::Expiration);
                }
            });
        }

        // 4. Enforce capacity.
        {
            let PolicyCore { s3, timer } = &mut *core;
            s3.evict(|victim| {
                timer.remove(victim);
                if victim.is_alive()
                    && self.index.remove_if_same(victim, || {
                        self.fire_atomic(victim, DeletionCause::Overflow)
                    })
                {
                    self.stats.record_eviction(victim.weight());
                    self.collect_event(&mut events, victim, DeletionCause::Overflow);
                }
            });
        }

        events
    }

    fn apply_task(
        &self,
        core: &mut PolicyCore<K, V>,
        task: Task<K, V>,
        events: &mut Vec<DeletionEvent<K, V>>,
    ) {
        match task {
            Task::Add(entry) => {
                // A dead entry's cleanup and event belong to whichever task
                // retired it.
                if entry.is_alive() {
                    core.s3.on_add(&entry);
                    core.timer.add(&entry);
                }
            }
            Task::Update { new, old, old_cause } | Task::Replace { new, old, old_cause } => {
                core.s3.on_replace(&old, &new);
                if self.expiry.inherits_on_update()
                    && new.is_alive()
                    && new.expires_at() == old.expires_at()
                {
                    core.timer.replace_in_place(&old, &new);
                } else {
                    core.timer.remove(&old);
                    if new.is_alive() {
                        core.timer.add(&new);
                    }
                }
                if old_cause.was_evicted() {
                    self.stats.record_eviction(old.weight());
                }
                self.collect_event(events, &old, old_cause);
            }
            Task::Invalidate { entry, cause } => {
                core.s3.unlink(&entry);
                core.timer.remove(&entry);
                if cause.was_evicted() {
                    self.stats.record_eviction(entry.weight());
                }
                self.collect_event(events, &entry, cause);
            }
            Task::Expire(entry) => {
                core.s3.unlink(&entry);
                core.timer.remove(&entry);
                self.stats.record_eviction(entry.weight());
                self.collect_event(events, &entry, DeletionCause::Expiration);
            }
            Task::Resize(maximum) => core.s3.resize(maximum),
        }
    }

    fn dispatch_events(&self, events: Vec<DeletionEvent<K, V>>) {
        if events.is_empty() {
            return;
        }
        let Some(listener) = self.on_deletion.clone() else {
            return;
        };
        (self.executor)(Box::new(move || {
            for event in events {
                listener(event);
            }
        }));
    }
}

// ----------------------------------------------------------------------
// Facade
// ----------------------------------------------------------------------

/// Bounded, concurrent, in-process cache.
///
/// Built through [`Builder`](crate::Builder); cheap to clone, all clones
/// share the same underlying cache.
///
/// # Example
///
/// ```
/// use brimcache::Builder;
///
/// let cache = Builder::new().maximum_size(100).build();
///
/// cache.set("answer", 42);
/// assert_eq!(cache.get_if_present(&"answer"), Some(42));
///
/// cache.invalidate(&"answer");
/// assert_eq!(cache.get_if_present(&"answer"), None);
/// ```
///
/// # Reentrancy
///
/// Closures passed to [`compute`](Cache::compute) and its variants, the
/// weigher, and the atomic deletion listener run inside cache-internal
/// critical sections and must not call back into the cache; doing so can
/// deadlock on the shard or policy locks. The asynchronous deletion listener
/// runs on the executor and is free to reenter.
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("estimated_size", &self.estimated_size())
            .field("maximum", &self.inner.maximum.load(Ordering::Relaxed))
            .field("weighted", &self.inner.weighted)
            .finish_non_exhaustive()
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Starts building a cache.
    pub fn builder() -> crate::Builder<K, V> {
        crate::Builder::new()
    }

    pub(crate) fn from_inner(inner: Inner<K, V>) -> Self {
        let inner = Arc::new(inner);
        let _ = inner.self_ref.set(Arc::downgrade(&inner));
        Self { inner }
    }

    /// Returns a clone of the value for `key`, if a live entry exists.
    /// Records a hit or a miss and feeds the read into the policy.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.inner.read(key).map(|entry| entry.value().clone())
    }

    /// Like [`get_if_present`](Cache::get_if_present) but without cloning
    /// the value. Records statistics the same way.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read(key).is_some()
    }

    /// Inserts or replaces the entry for `key`, returning the previous
    /// value. A replaced predecessor is retired with cause `Replacement`.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.inner.write(key, value, false)
    }

    /// Inserts only when no live entry exists. Returns the existing value
    /// when the insert lost, `None` when it won.
    pub fn set_if_absent(&self, key: K, value: V) -> Option<V> {
        self.inner.write(key, value, true)
    }

    /// Atomic read-modify-write for `key`.
    ///
    /// The closure observes the current value (if any) and picks a
    /// [`ComputeOp`]; the mutation is applied under the shard lock only
    /// after the closure returns, so a panic leaves the cache untouched.
    /// Returns the value the key maps to after the operation.
    ///
    /// The closure must not call back into the cache.
    pub fn compute(&self, key: K, f: impl FnOnce(Option<&V>) -> ComputeOp<V>) -> Option<V> {
        self.inner.compute(&key, f)
    }

    /// Inserts the computed value when no live entry exists. The closure
    /// returns `None` to cancel, in which case nothing is inserted. It is
    /// never invoked while a live entry exists.
    pub fn compute_if_absent(&self, key: K, f: impl FnOnce() -> Option<V>) -> Option<V> {
        self.inner.compute_if_absent(&key, f)
    }

    /// Read-modify-write restricted to present entries; the closure is never
    /// invoked when the key is absent.
    pub fn compute_if_present(&self, key: &K, f: impl FnOnce(&V) -> ComputeOp<V>) -> Option<V> {
        self.inner.compute_if_present(key, f)
    }

    /// Removes the entry for `key`, returning its value. The entry is
    /// retired with cause `Invalidation`.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.inner.invalidate(key)
    }

    /// Removes every entry. Each is retired with cause `Invalidation`.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Runs a synchronous maintenance pass: drains both buffers, expires due
    /// entries, and enforces capacity before returning.
    pub fn clean_up(&self) {
        self.inner.maintain();
    }

    /// Number of live entries. Loosely consistent under concurrent writes.
    pub fn estimated_size(&self) -> usize {
        self.inner.index.len()
    }

    /// The current maximum (entry count or total weight, depending on how
    /// the cache was built), or `u64::MAX` when unbounded.
    pub fn maximum(&self) -> u64 {
        self.inner.maximum.load(Ordering::Acquire)
    }

    /// Replaces the maximum and evicts down to it on the next maintenance
    /// pass.
    ///
    /// # Panics
    ///
    /// Panics when the cache was built without a maximum, or when `maximum`
    /// is zero.
    pub fn set_maximum(&self, maximum: u64) {
        assert!(
            self.inner.bounded,
            "set_maximum requires a cache built with a maximum"
        );
        assert!(maximum > 0, "maximum must be greater than zero");
        self.inner.maximum.store(maximum, Ordering::Release);
        self.inner.submit(Task::Resize(maximum));
    }

    /// Whether entries are weighed by a user-supplied weigher.
    pub fn is_weighted(&self) -> bool {
        self.inner.weighted
    }

    /// Whether a non-noop statistics recorder is attached.
    pub fn is_recording_stats(&self) -> bool {
        self.inner.recording_stats
    }

    /// The attached statistics recorder.
    pub fn stats(&self) -> Arc<dyn StatsRecorder> {
        self.inner.stats.clone()
    }

    /// Weakly consistent iterator over `(key, value)` clones.
    ///
    /// The traversal tolerates concurrent mutation: it may observe or skip
    /// concurrent updates but never yields retired or expired entries.
    pub fn iter(&self) -> Iter<K, V> {
        Iter {
            inner: Arc::clone(&self.inner),
            shard: 0,
            batch: Vec::new().into_iter(),
        }
    }

    /// Weakly consistent iterator over key clones.
    pub fn keys(&self) -> Keys<K, V> {
        Keys { iter: self.iter() }
    }

    /// Weakly consistent iterator over value clones.
    pub fn values(&self) -> Values<K, V> {
        Values { iter: self.iter() }
    }
}

// ----------------------------------------------------------------------
// Iteration
// ----------------------------------------------------------------------

/// Weakly consistent `(key, value)` iterator. See [`Cache::iter`].
pub struct Iter<K, V> {
    inner: Arc<Inner<K, V>>,
    shard: usize,
    batch: std::vec::IntoIter<EntryRef<K, V>>,
}

impl<K, V> Iterator for Iter<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.batch.next() {
                if entry.is_alive() && !entry.is_expired(self.inner.clock.now()) {
                    return Some((entry.key().clone(), entry.value().clone()));
                }
                continue;
            }
            if self.shard >= self.inner.index.shard_count() {
                return None;
            }
            self.batch = self.inner.index.snapshot_shard(self.shard).into_iter();
            self.shard += 1;
        }
    }
}

impl<K, V> fmt::Debug for Iter<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("shard", &self.shard).finish()
    }
}

/// Weakly consistent key iterator. See [`Cache::keys`].
pub struct Keys<K, V> {
    iter: Iter<K, V>,
}

impl<K, V> Iterator for Keys<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(key, _)| key)
    }
}

impl<K, V> fmt::Debug for Keys<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys").finish()
    }
}

/// Weakly consistent value iterator. See [`Cache::values`].
pub struct Values<K, V> {
    iter: Iter<K, V>,
}

impl<K, V> Iterator for Values<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(_, value)| value)
    }
}

impl<K, V> fmt::Debug for Values<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Values").finish()
    }
}
