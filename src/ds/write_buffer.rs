//! Bounded MPSC buffer of policy tasks.
//!
//! Writers record index mutations here for the maintenance pass to replay
//! against the policy and timer structures. Unlike the read buffer this
//! queue is **never lossy**: a full buffer pushes back on the writer, which
//! runs a maintenance pass inline and retries. Dropping a task would leak
//! policy state (an entry linked nowhere, or unlinked twice).

use crossbeam_queue::ArrayQueue;

/// Bounded multi-producer queue drained by the single maintenance writer.
#[derive(Debug)]
pub(crate) struct WriteBuffer<T> {
    queue: ArrayQueue<T>,
}

impl<T> WriteBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Attempts to enqueue a task, handing it back when the buffer is full.
    /// The caller must then drain (run maintenance) and retry.
    #[inline]
    pub(crate) fn push(&self, task: T) -> Result<(), T> {
        self.queue.push(task)
    }

    /// Pops the next task, maintenance-side only.
    #[inline]
    pub(crate) fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the buffer is full enough that the next writer should drain
    /// inline instead of deferring to the scheduled pass.
    #[inline]
    pub(crate) fn should_drain(&self) -> bool {
        self.queue.len() >= self.queue.capacity() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let buffer = WriteBuffer::new(8);
        for i in 0..5u32 {
            buffer.push(i).unwrap();
        }
        for i in 0..5u32 {
            assert_eq!(buffer.pop(), Some(i));
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn full_buffer_returns_task() {
        let buffer = WriteBuffer::new(2);
        buffer.push('a').unwrap();
        buffer.push('b').unwrap();
        assert_eq!(buffer.push('c'), Err('c'));

        buffer.pop();
        buffer.push('c').unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn should_drain_at_half_capacity() {
        let buffer = WriteBuffer::new(8);
        for i in 0..3u32 {
            buffer.push(i).unwrap();
            assert!(!buffer.should_drain());
        }
        buffer.push(3).unwrap();
        assert!(buffer.should_drain());
    }

    #[test]
    fn concurrent_producers_single_consumer() {
        use std::sync::Arc;

        let buffer = Arc::new(WriteBuffer::new(1024));
        let mut handles = Vec::new();
        for t in 0..4u64 {
            let buffer = buffer.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    let mut task = t * 1000 + j;
                    loop {
                        match buffer.push(task) {
                            Ok(()) => break,
                            Err(back) => task = back,
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while buffer.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 400);
    }
}
