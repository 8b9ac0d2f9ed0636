//! Crate level errors.
//!
//! The store deliberately keeps a flat error surface:
//!
//! - [`Error::Backend`]: the backing store was unreachable or rejected a
//!   batch. Never retried internally; retry policy belongs to the caller.
//! - [`Error::EmptyBucket`]: a `get` found no stored values. This is a
//!   distinct condition, not an I/O failure; the caller must not treat it
//!   as "zero samples".
//! - [`Error::Encoding`]: an identity or value payload failed to decode.
//!   During scans these are logged and skipped rather than propagated.
//! - [`Error::Config`]: invalid construction parameters.
//! - [`Error::Cancelled`]: a lock-acquisition wait was cancelled by the
//!   caller's [`CancellationToken`](tokio_util::sync::CancellationToken).

use std::result;

use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Errors reported by the bucket store and its backends.
#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    /// The backing store was unreachable, authentication failed, or an
    /// atomic batch was rejected as a whole.
    #[error("backend error: {0}")]
    Backend(String),

    /// A `get` found no values for the bucket's key. The key is either
    /// absent, already drained, or expired.
    #[error("empty bucket: {0}")]
    EmptyBucket(String),

    /// An identity or value payload could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation was cancelled before it could complete.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for the "no data" condition reported by `get`.
    pub fn is_empty_bucket(&self) -> bool {
        matches!(self, Error::EmptyBucket(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Backend(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Backend("connection refused".to_string());
        let display = format!("{}", err);
        assert!(display.contains("backend error"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_empty_bucket_is_distinct() {
        let err = Error::EmptyBucket("requests.latency".to_string());
        assert!(err.is_empty_bucket());
        assert!(!Error::Backend("x".to_string()).is_empty_bucket());
        assert!(!Error::Cancelled.is_empty_bucket());
    }

    #[test]
    fn test_error_eq() {
        assert_eq!(Error::Cancelled, Error::Cancelled);
        assert_ne!(
            Error::Backend("a".to_string()),
            Error::Backend("b".to_string())
        );
    }

    #[test]
    fn test_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(Error::Config("bad".to_string()));
        assert!(err.to_string().contains("configuration error"));
    }
}
