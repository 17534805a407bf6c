//! Core types for jobflow.
//!
//! This crate provides the foundational types used throughout the workspace:
//!
//! - **Identifiers**: opaque service-assigned cluster and step IDs, and local watch IDs
//! - **Lifecycle states**: step and cluster states with their wire strings and terminal sets
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use jobflow_core::{ClusterId, StepId, StepState};
//!
//! let cluster_id = ClusterId::new("j-2AXXXXXXGAPLF").unwrap();
//! let step_id: StepId = "s-1BCDEFGHIJKL".parse().unwrap();
//!
//! let state: StepState = "COMPLETED".parse().unwrap();
//! assert!(state.is_terminal());
//! # let _ = (cluster_id, step_id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod state;

pub use error::{CoreError, Result};
pub use ids::{ClusterId, IdError, StepId, WatchId};
pub use state::{ClusterState, StepState};
