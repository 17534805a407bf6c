//! Lifecycle states reported by the orchestration service.
//!
//! The wire strings are fixed by the service and must match exactly; serde
//! and [`FromStr`] both use them.
//!
//! # Step lifecycle
//!
//! ```text
//!   PENDING ──▶ RUNNING ──▶ COMPLETED
//!      │           │
//!      │           ├──────▶ FAILED
//!      │           └──────▶ INTERRUPTED
//!      ▼
//!   CANCEL_PENDING ──▶ CANCELLED
//! ```
//!
//! Once a terminal state is observed no further transition is expected and
//! any poller watching the step stops.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    /// Waiting to be scheduled on the cluster.
    Pending,
    /// Cancellation requested but not yet applied.
    CancelPending,
    /// Executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Cancelled before or during execution.
    Cancelled,
    /// Finished with an error.
    Failed,
    /// Stopped because the cluster went away.
    Interrupted,
}

impl StepState {
    /// Every step state, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::CancelPending,
        Self::Running,
        Self::Completed,
        Self::Cancelled,
        Self::Failed,
        Self::Interrupted,
    ];

    /// States after which polling stops.
    pub const TERMINAL: [Self; 4] = [
        Self::Completed,
        Self::Cancelled,
        Self::Failed,
        Self::Interrupted,
    ];

    /// The wire-level string for this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::CancelPending => "CANCEL_PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Interrupted => "INTERRUPTED",
        }
    }

    /// Returns true if no further transition is expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed | Self::Interrupted
        )
    }

    /// Returns true if the step ended without completing.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Interrupted)
    }

    /// Comma-separated list of valid wire strings, for error messages.
    #[must_use]
    pub fn valid_values() -> String {
        Self::ALL
            .iter()
            .map(Self::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::UnknownState {
                kind: "step",
                value: s.to_string(),
            })
    }
}

/// Lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// Instances are being provisioned.
    Starting,
    /// Bootstrap actions are running.
    Bootstrapping,
    /// Executing steps.
    Running,
    /// Idle and kept alive, waiting for steps.
    Waiting,
    /// Shutting down.
    Terminating,
    /// Shut down normally.
    Terminated,
    /// Shut down because of an error.
    TerminatedWithErrors,
}

impl ClusterState {
    /// Every cluster state, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Starting,
        Self::Bootstrapping,
        Self::Running,
        Self::Waiting,
        Self::Terminating,
        Self::Terminated,
        Self::TerminatedWithErrors,
    ];

    /// The wire-level string for this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Bootstrapping => "BOOTSTRAPPING",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::TerminatedWithErrors => "TERMINATED_WITH_ERRORS",
        }
    }

    /// Returns true if the cluster is shutting down or gone, i.e. a
    /// termination cause is available.
    #[must_use]
    pub const fn has_termination_cause(&self) -> bool {
        matches!(
            self,
            Self::Terminating | Self::Terminated | Self::TerminatedWithErrors
        )
    }

    /// Returns true if the cluster no longer exists.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::TerminatedWithErrors)
    }

    /// Returns true if the cluster can accept new steps.
    #[must_use]
    pub const fn accepts_steps(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Bootstrapping | Self::Running | Self::Waiting
        )
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::UnknownState {
                kind: "cluster",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_wire_strings() {
        for state in StepState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            assert_eq!(state.as_str().parse::<StepState>().unwrap(), state);
        }
        assert_eq!(StepState::CancelPending.as_str(), "CANCEL_PENDING");
    }

    #[test]
    fn step_terminal_states() {
        use StepState::*;

        for state in [Completed, Cancelled, Failed, Interrupted] {
            assert!(state.is_terminal(), "{state} should be terminal");
            assert!(StepState::TERMINAL.contains(&state));
        }
        for state in [Pending, CancelPending, Running] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
    }

    #[test]
    fn step_failure_states() {
        assert!(StepState::Failed.is_failure());
        assert!(StepState::Interrupted.is_failure());
        assert!(!StepState::Completed.is_failure());
        assert!(!StepState::Running.is_failure());
    }

    #[test]
    fn unknown_step_state_rejected() {
        let err = "BOGUS".parse::<StepState>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownState { kind: "step", .. }));
        // Case matters on the wire.
        assert!("completed".parse::<StepState>().is_err());
    }

    #[test]
    fn valid_values_lists_every_state() {
        let values = StepState::valid_values();
        assert!(values.starts_with("PENDING, CANCEL_PENDING"));
        assert!(values.ends_with("INTERRUPTED"));
    }

    #[test]
    fn cluster_wire_strings() {
        for state in ClusterState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            assert_eq!(state.as_str().parse::<ClusterState>().unwrap(), state);
        }
    }

    #[test]
    fn cluster_termination_cause_states() {
        use ClusterState::*;

        assert!(Terminating.has_termination_cause());
        assert!(Terminated.has_termination_cause());
        assert!(TerminatedWithErrors.has_termination_cause());
        assert!(!Waiting.has_termination_cause());
        assert!(!Running.has_termination_cause());

        assert!(!Terminating.is_terminal());
        assert!(Terminated.is_terminal());
        assert!(Waiting.accepts_steps());
        assert!(!Terminating.accepts_steps());
    }
}
