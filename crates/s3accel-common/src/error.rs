//! Error types for s3accel
//!
//! This module defines the error taxonomy shared by the block cache engine,
//! the transport clients and the stream front-end.

use crate::types::{BucketNameError, ObjectKeyError};
use thiserror::Error;

/// Common result type for s3accel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for s3accel
#[derive(Debug, Error)]
pub enum Error {
    // Caller errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(#[from] BucketNameError),

    #[error("invalid object key: {0}")]
    InvalidObjectKey(#[from] ObjectKeyError),

    #[error("invalid object uri: {0}")]
    InvalidUri(String),

    // Transport errors
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("stream closed: {0}")]
    StreamClosed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Resource errors
    #[error("failed to release resource: {0}")]
    ResourceRelease(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a resource release error
    pub fn resource_release(msg: impl Into<String>) -> Self {
        Self::ResourceRelease(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error was caused by the caller's input
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::InvalidBucketName(_)
                | Self::InvalidObjectKey(_)
                | Self::InvalidUri(_)
        )
    }

    /// Check if this error came from the object transport
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound { .. }
                | Self::Transport(_)
                | Self::ShortRead { .. }
                | Self::Io(_)
        )
    }

    /// Check if a retry at the transport layer could succeed.
    ///
    /// The block cache never retries on its own; this is a hint for the
    /// transport collaborator.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ShortRead { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::invalid_argument("n").is_invalid_argument());
        assert!(Error::InvalidUri("x".into()).is_invalid_argument());
        assert!(!Error::Cancelled.is_invalid_argument());

        assert!(Error::transport("reset").is_transport());
        assert!(Error::ObjectNotFound {
            bucket: "b".into(),
            key: "k".into()
        }
        .is_transport());
        assert!(!Error::Cancelled.is_transport());
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::transport("connection reset").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(Error::ShortRead {
            expected: 10,
            actual: 4
        }
        .is_retryable());
        assert!(!Error::invalid_argument("bad").is_retryable());
        assert!(!Error::resource_release("abort").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::invalid_argument(
            "cannot request more bytes from tail than total number of bytes",
        );
        assert_eq!(
            err.to_string(),
            "invalid argument: cannot request more bytes from tail than total number of bytes"
        );
    }
}
