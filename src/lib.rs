//! brimcache: a bounded, concurrent, in-process key-value cache.
//!
//! Admission and eviction follow the S3-FIFO policy backed by a count-min
//! frequency sketch; reads are recorded through a lossy striped buffer and
//! writes through a bounded task queue, both drained by a single-writer
//! maintenance pass. Expiration is either a fixed duration (after write,
//! creation, or access) or fully variable on a hierarchical timer wheel.
//!
//! ```
//! use brimcache::Builder;
//!
//! let cache = Builder::new().maximum_size(10_000).build();
//! cache.set("user:42", "profile");
//! assert_eq!(cache.get_if_present(&"user:42"), Some("profile"));
//! ```

mod builder;
mod cache;
mod clock;
mod ds;
mod entry;
mod error;
mod event;
mod expiry;
mod index;
mod policy;
mod stats;

pub use builder::Builder;
pub use cache::{Cache, ComputeOp, Iter, Keys, Values};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ConfigError;
pub use event::{DeletionCause, DeletionEvent, Executor, Job};
pub use expiry::Expiry;
pub use stats::{NoopStats, StatsCounter, StatsRecorder, StatsSnapshot};
