//! Admission and eviction policy.

pub(crate) mod s3_fifo;
