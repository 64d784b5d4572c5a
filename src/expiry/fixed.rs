//! Fixed-duration expiration queue.
//!
//! When every entry lives for the same duration counted from the same kind
//! of event (write, creation, or access), deadlines are monotone in link
//! order and a single FIFO suffices: new deadlines link at the tail, the
//! expiry scan walks from the head and stops at the first entry that is not
//! yet due.
//!
//! Access-based expiry keeps the ordering by moving a touched entry to the
//! tail; creation-based expiry keeps it by linking a replacement at the
//! predecessor's slot (the deadline is inherited, so the position stays
//! correct).

use crate::ds::arena::{LinkArena, NIL};
use crate::ds::deque::Deque;
use crate::entry::EntryRef;

/// FIFO of entries ordered by (monotone) deadline.
pub(crate) struct FixedQueue<K, V> {
    arena: LinkArena<EntryRef<K, V>>,
    deque: Deque,
}

impl<K, V> FixedQueue<K, V> {
    pub(crate) fn new() -> Self {
        let mut arena = LinkArena::new();
        let deque = Deque::new(&mut arena);
        Self { arena, deque }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.deque.len()
    }

    /// Links an entry at the tail.
    pub(crate) fn add(&mut self, entry: &EntryRef<K, V>) {
        debug_assert_eq!(entry.timer_node(), NIL);
        let node = self.deque.push_back(&mut self.arena, entry.clone());
        entry.set_timer_node(node);
    }

    /// Unlinks an entry, tolerating entries that were never linked.
    pub(crate) fn remove(&mut self, entry: &EntryRef<K, V>) {
        let node = entry.timer_node();
        if node == NIL {
            return;
        }
        let _ = self.deque.unlink(&mut self.arena, node);
        entry.set_timer_node(NIL);
    }

    /// Moves a touched entry to the tail (access-based refresh).
    pub(crate) fn move_to_back(&mut self, entry: &EntryRef<K, V>) {
        let node = entry.timer_node();
        if node == NIL {
            return;
        }
        self.deque.move_to_back(&mut self.arena, node);
    }

    /// Links `new` at `old`'s position and unlinks `old`. Falls back to a
    /// plain tail link when `old` was never linked.
    pub(crate) fn replace_in_place(&mut self, old: &EntryRef<K, V>, new: &EntryRef<K, V>) {
        let old_node = old.timer_node();
        if old_node == NIL {
            if new.has_deadline() {
                self.add(new);
            }
            return;
        }
        if new.has_deadline() {
            let node = self
                .deque
                .insert_before(&mut self.arena, old_node, new.clone());
            new.set_timer_node(node);
        }
        let _ = self.deque.unlink(&mut self.arena, old_node);
        old.set_timer_node(NIL);
    }

    /// Unlinks entries from the head while their deadline is at or before
    /// `now`, handing each to `expire` in deadline order.
    pub(crate) fn expire(&mut self, now: i64, mut expire: impl FnMut(EntryRef<K, V>)) {
        while let Some(head) = self.deque.front(&self.arena) {
            let due = self
                .arena
                .value(head)
                .is_some_and(|entry| entry.expires_at() <= now);
            if !due {
                break;
            }
            if let Some(entry) = self.deque.unlink(&mut self.arena, head) {
                entry.set_timer_node(NIL);
                expire(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use std::sync::Arc;

    fn entry(key: u64, expires_at: i64) -> EntryRef<u64, u64> {
        Arc::new(Entry::new(key, key, key, 1, expires_at))
    }

    #[test]
    fn expires_in_deadline_order() {
        let mut queue = FixedQueue::new();
        let entries = [entry(1, 100), entry(2, 200), entry(3, 300)];
        for e in &entries {
            queue.add(e);
        }

        let mut expired = Vec::new();
        queue.expire(250, |e| expired.push(*e.key()));
        assert_eq!(expired, vec![1, 2]);
        assert_eq!(queue.len(), 1);

        // The survivors keep their node links.
        assert_ne!(entries[2].timer_node(), NIL);
        assert_eq!(entries[0].timer_node(), NIL);
    }

    #[test]
    fn scan_stops_at_first_live_deadline() {
        let mut queue = FixedQueue::new();
        queue.add(&entry(1, 500));
        queue.add(&entry(2, 600));

        let mut expired = Vec::new();
        queue.expire(100, |e| expired.push(*e.key()));
        assert!(expired.is_empty());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn remove_unlinks() {
        let mut queue = FixedQueue::new();
        let e = entry(1, 100);
        queue.add(&e);
        queue.remove(&e);
        assert_eq!(e.timer_node(), NIL);
        assert_eq!(queue.len(), 0);

        // Second removal is a no-op.
        queue.remove(&e);
    }

    #[test]
    fn move_to_back_defers_expiry() {
        let mut queue = FixedQueue::new();
        let first = entry(1, 100);
        let second = entry(2, 200);
        queue.add(&first);
        queue.add(&second);

        // Simulate an access refresh of the first entry.
        first.set_expires_at(300);
        queue.move_to_back(&first);

        let mut expired = Vec::new();
        queue.expire(250, |e| expired.push(*e.key()));
        assert_eq!(expired, vec![2]);
    }

    #[test]
    fn replace_in_place_keeps_position() {
        let mut queue = FixedQueue::new();
        let first = entry(1, 100);
        let second = entry(2, 200);
        queue.add(&first);
        queue.add(&second);

        // Replacement inherits the deadline of `first` and its slot.
        let replacement = entry(10, 100);
        queue.replace_in_place(&first, &replacement);
        assert_eq!(first.timer_node(), NIL);
        assert_eq!(queue.len(), 2);

        let mut expired = Vec::new();
        queue.expire(150, |e| expired.push(*e.key()));
        assert_eq!(expired, vec![10]);
    }
}
