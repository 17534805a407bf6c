//! Error types for cluster and step management.
//!
//! This module defines all errors that can occur while launching clusters,
//! submitting steps, normalizing status and watching steps.

use jobflow_core::{ClusterId, StepId};
use jobflow_storage::StorageError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested remote entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller input was rejected before any remote or background work began.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The orchestration service failed or answered with an error.
    #[error("{operation} failed: {message}")]
    Remote {
        /// The remote operation, e.g. `DescribeStep`.
        operation: &'static str,
        /// Error detail reported by the service or transport.
        message: String,
    },

    /// Object storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A payload could not be decoded.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// The service accepted a request but its response lacked the identifier.
    #[error("{operation} response did not include {field}")]
    MissingIdentifier {
        /// The remote operation.
        operation: &'static str,
        /// The missing response field.
        field: &'static str,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Build a not-found error for a step.
    #[must_use]
    pub fn step_not_found(cluster_id: &ClusterId, step_id: &StepId) -> Self {
        Self::NotFound(format!("step {step_id} on cluster {cluster_id}"))
    }

    /// Build a not-found error for a cluster.
    #[must_use]
    pub fn cluster_not_found(cluster_id: &ClusterId) -> Self {
        Self::NotFound(format!("cluster {cluster_id}"))
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Remote { .. } | Self::Internal(_) => true,
            Self::Storage(e) => e.is_retriable(),
            Self::NotFound(_)
            | Self::Validation(_)
            | Self::DataFormat(_)
            | Self::MissingIdentifier { .. } => false,
        }
    }

    /// Returns true if this error was raised by input validation.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<jobflow_core::CoreError> for ControlError {
    fn from(err: jobflow_core::CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}
