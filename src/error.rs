//! Error types for the brimcache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. a zero capacity, a weigher without a weight bound).
//!
//! ## Example Usage
//!
//! ```
//! use brimcache::{Builder, ConfigError};
//!
//! // Fallible constructor for user-configurable parameters
//! let cache: Result<brimcache::Cache<u64, String>, ConfigError> =
//!     Builder::new().maximum_size(100).try_build();
//! assert!(cache.is_ok());
//!
//! // An invalid combination is caught without panicking
//! let bad = Builder::<u64, String>::new()
//!     .maximum_size(100)
//!     .maximum_weight(100)
//!     .try_build();
//! assert!(bad.is_err());
//! ```

use std::fmt;

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`Builder::try_build`](crate::Builder::try_build). The
/// panicking [`Builder::build`](crate::Builder::build) surfaces the same
/// message through a panic. Carries a human-readable description of which
/// parameter failed validation.
///
/// # Example
///
/// ```
/// use brimcache::Builder;
///
/// let err = Builder::<u64, u64>::new().maximum_size(0).try_build().unwrap_err();
/// assert!(err.to_string().contains("maximum"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_message() {
        let err = ConfigError::new("maximum must be greater than zero");
        assert_eq!(err.to_string(), "maximum must be greater than zero");
    }

    #[test]
    fn debug_includes_message() {
        let err = ConfigError::new("bad weigher");
        let dbg = format!("{:?}", err);
        assert!(dbg.contains("bad weigher"));
    }

    #[test]
    fn message_accessor() {
        let err = ConfigError::new("test");
        assert_eq!(err.message(), "test");
    }

    #[test]
    fn implements_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<ConfigError>();
    }
}
