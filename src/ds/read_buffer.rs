//! Striped lossy read buffer.
//!
//! Cache hits are recorded here instead of touching the policy lock: one
//! lock-free push into a per-thread stripe. Each stripe is a small bounded
//! ring; when a stripe is full the record is **silently dropped**, because
//! the frequency sketch is approximate anyway and losing an occasional read
//! beats stalling the read path. The caller is told about the drop so it can
//! schedule a maintenance pass, which is the only consumer.
//!
//! Threads are pinned to a stripe by a thread-local token assigned on first
//! use, so unrelated readers rarely contend on the same ring.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;

/// Slots per stripe.
const STRIPE_CAPACITY: usize = 16;

/// Counter handing out stripe tokens to threads.
static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Stripe token for the current thread, assigned once on first use.
    static THREAD_TOKEN: usize = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Lossy striped buffer of read records.
#[derive(Debug)]
pub(crate) struct ReadBuffer<T> {
    stripes: Box<[ArrayQueue<T>]>,
    mask: usize,
}

impl<T> ReadBuffer<T> {
    /// Creates a buffer with `stripes` rings (rounded up to a power of two)
    /// of [`STRIPE_CAPACITY`] slots each.
    pub(crate) fn new(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        let stripes = (0..count)
            .map(|_| ArrayQueue::new(STRIPE_CAPACITY))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            stripes,
            mask: count - 1,
        }
    }

    /// Records a read. Returns `false` when the calling thread's stripe was
    /// full and the record was dropped; the caller should schedule a drain.
    #[inline]
    pub(crate) fn push(&self, value: T) -> bool {
        let stripe = THREAD_TOKEN.with(|token| *token) & self.mask;
        self.stripes[stripe].push(value).is_ok()
    }

    /// Total records currently buffered across all stripes.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.stripes.iter().map(ArrayQueue::len).sum()
    }

    /// Pops every buffered record into `consume`. Only the maintenance pass
    /// calls this, under the policy lock.
    pub(crate) fn drain(&self, mut consume: impl FnMut(T)) {
        for stripe in self.stripes.iter() {
            while let Some(value) = stripe.pop() {
                consume(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_round_trip() {
        let buffer = ReadBuffer::new(4);
        assert!(buffer.push(42u64));
        assert!(buffer.push(99));

        let mut out = Vec::new();
        buffer.drain(|v| out.push(v));
        out.sort_unstable();
        assert_eq!(out, vec![42, 99]);
    }

    #[test]
    fn drain_clears_buffer() {
        let buffer = ReadBuffer::new(2);
        buffer.push(1u64);
        buffer.drain(|_| {});
        assert_eq!(buffer.len(), 0);

        let mut out = Vec::new();
        buffer.drain(|v| out.push(v));
        assert!(out.is_empty());
    }

    #[test]
    fn overflow_is_lossy_and_reported() {
        let buffer = ReadBuffer::new(1);
        let mut accepted = 0;
        for i in 0..(2 * STRIPE_CAPACITY as u64) {
            if buffer.push(i) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, STRIPE_CAPACITY);
        assert_eq!(buffer.len(), STRIPE_CAPACITY);
    }

    #[test]
    fn stripe_count_rounds_to_power_of_two() {
        let buffer: ReadBuffer<u64> = ReadBuffer::new(3);
        assert_eq!(buffer.stripes.len(), 4);
        let buffer: ReadBuffer<u64> = ReadBuffer::new(0);
        assert_eq!(buffer.stripes.len(), 1);
    }

    #[test]
    fn concurrent_pushes_do_not_panic() {
        use std::sync::Arc;

        let buffer = Arc::new(ReadBuffer::new(8));
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let buffer = buffer.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    buffer.push(t * 1000 + j);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut out = Vec::new();
        buffer.drain(|v| out.push(v));
        assert!(!out.is_empty(), "expected some records after concurrent pushes");
    }
}
