//! Internal data structures backing the cache core.
//!
//! - [`arena`]: slot arena of doubly-linked nodes, the storage for every
//!   sentinel-rooted list in the crate
//! - [`deque`]: list handle over the arena with O(1) link/unlink/move
//! - [`ghost`]: bounded fingerprint ring for ghost admission
//! - [`sketch`]: count-min frequency sketch with 4-bit counters
//! - [`read_buffer`]: striped lossy buffer for read recording
//! - [`write_buffer`]: bounded MPSC queue of policy tasks

pub(crate) mod arena;
pub(crate) mod deque;
pub(crate) mod ghost;
pub(crate) mod read_buffer;
pub(crate) mod sketch;
pub(crate) mod write_buffer;
