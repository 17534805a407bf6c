//! Status and result types returned by control operations.

use chrono::{DateTime, Utc};
use jobflow_core::{ClusterId, ClusterState, StepId, StepState};
use serde::{Deserialize, Serialize};

use crate::wire::FailurePolicy;

/// Failure information attached to a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    /// Reason reported by the service, `"Unknown"` when it gave none.
    pub reason: String,
    /// Object path of the step's log, as reported.
    pub logfile_path: Option<String>,
}

/// Simplified snapshot of a step. A new one is built on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Step display name.
    pub name: String,
    /// Ordered step arguments.
    pub parameters: Vec<String>,
    /// What the cluster does if the step fails.
    pub failure_policy: FailurePolicy,
    /// Current lifecycle state.
    pub state: StepState,
    /// Present when the service reported failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetails>,
    /// When the snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

/// Why a diagnostic log could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum DiagnosticError {
    /// Object storage failed for a reason other than a missing object.
    #[error("I/O error reading diagnostic log: {0}")]
    Io(String),
    /// The log object was not valid gzip.
    #[error("diagnostic log is corrupt: {0}")]
    DataFormat(String),
}

/// The diagnostic log of a step, as far as it could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The step has no failure details or no log path.
    NotApplicable,
    /// The log has not been flushed to storage yet; check again later.
    NotYetWritten,
    /// Decompressed log text.
    Text(String),
    /// The log exists (or should) but could not be read.
    Failed(DiagnosticError),
}

impl Diagnostic {
    /// The log text, if it was retrieved.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The read error, if there was one.
    #[must_use]
    pub const fn error(&self) -> Option<&DiagnosticError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Output of status normalization: the record plus its diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatus {
    /// Snapshot of the step.
    pub record: StatusRecord,
    /// Diagnostic log resolution.
    pub diagnostic: Diagnostic,
}

impl StepStatus {
    /// Current state of the step.
    #[must_use]
    pub const fn state(&self) -> StepState {
        self.record.state
    }
}

/// A step as listed on a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Step identifier.
    pub id: StepId,
    /// Display name.
    pub name: String,
    /// Current lifecycle state.
    pub state: StepState,
}

/// Simplified snapshot of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Cluster identifier.
    pub id: ClusterId,
    /// Display name.
    pub name: String,
    /// Current lifecycle state.
    pub state: ClusterState,
    /// Steps in submission order.
    pub steps: Vec<StepSummary>,
    /// Whether this process asked for the cluster to be terminated.
    pub termination_requested: bool,
    /// Set only while terminating or terminated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_cause: Option<String>,
}

/// Result of launching a cluster together with its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchedCluster {
    /// The new cluster.
    pub cluster_id: ClusterId,
    /// Its steps in submission order.
    pub step_ids: Vec<StepId>,
}
