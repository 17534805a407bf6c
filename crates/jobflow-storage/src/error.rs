//! Error types for the storage crate.

use thiserror::Error;

/// Errors that can occur when talking to object storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The object does not exist (yet).
    #[error("object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket that was queried.
        bucket: String,
        /// Key that was queried.
        key: String,
    },

    /// A path could not be parsed as `scheme://bucket/key`.
    #[error("invalid object path {path:?}: {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The request never produced a response (connect, timeout, body read).
    #[error("storage request failed: {0}")]
    Request(String),

    /// The service answered with an error status.
    #[error("storage service returned {status}: {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Error body or summary.
        message: String,
    },

    /// Client configuration error.
    #[error("storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Returns true if the object simply does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Service { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::InvalidPath { .. } | Self::Config(_) => false,
        }
    }
}

/// A specialized Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_classification() {
        assert!(StorageError::Request("timeout".into()).is_retriable());
        assert!(StorageError::Service {
            status: 503,
            message: "slow down".into()
        }
        .is_retriable());
        assert!(!StorageError::Service {
            status: 403,
            message: "denied".into()
        }
        .is_retriable());
        assert!(!StorageError::NotFound {
            bucket: "b".into(),
            key: "k".into()
        }
        .is_retriable());
    }
}
