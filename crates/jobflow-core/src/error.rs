//! Common error types for jobflow.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the jobflow system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A state string did not match any known lifecycle state.
    #[error("unknown {kind} state: {value:?}")]
    UnknownState {
        /// Which state machine was being parsed ("step" or "cluster").
        kind: &'static str,
        /// The rejected value.
        value: String,
    },
}
