//! Watch session state machine.
//!
//! This module defines the phases a watch goes through and validates the
//! target state a caller asks to be notified about.
//!
//! # State Machine
//!
//! ```text
//!                    ┌─────────────────┐
//!        ┌──────────▶│    Watching     │─────────┐
//!        │           └────────┬────────┘         │
//!        │ (state != target)  │                  │ (channel closed)
//!        └────────────────────┤                  │
//!                             │ (state == target)│
//!                             ▼                  ▼
//!                    ┌─────────────────┐  ┌─────────────┐
//!                    │     Matched     │  │   Closed    │
//!                    └─────────────────┘  └─────────────┘
//! ```
//!
//! The callback fires on the single `Watching → Matched` transition. Both
//! `Matched` and `Closed` are final.

use jobflow_core::StepState;

use crate::error::{ControlError, Result};

/// Phase of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    /// Consuming observed states.
    Watching,
    /// The target state was observed and the callback ran.
    Matched,
    /// The channel closed before the target was observed.
    Closed,
}

impl WatchPhase {
    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Matched | Self::Closed)
    }

    /// Phase after observing `state` while waiting for `target`.
    #[must_use]
    pub fn observe(self, state: StepState, target: StepState) -> Self {
        match self {
            Self::Watching if state == target => Self::Matched,
            phase => phase,
        }
    }

    /// Phase after the channel closed.
    #[must_use]
    pub const fn close(self) -> Self {
        match self {
            Self::Watching => Self::Closed,
            phase => phase,
        }
    }
}

/// Check if a phase transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: WatchPhase, to: WatchPhase) -> bool {
    use WatchPhase::{Closed, Matched, Watching};

    matches!(
        (from, to),
        (Watching, Watching | Matched | Closed)
    )
}

/// Validates a phase transition and returns the target phase if valid.
///
/// # Errors
///
/// Returns `ControlError::Internal` if the transition is not allowed.
pub fn validate_transition(from: WatchPhase, to: WatchPhase) -> Result<WatchPhase> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::Internal(format!(
            "invalid watch transition {from:?} -> {to:?}"
        )))
    }
}

/// Parse the state a watch waits for.
///
/// # Errors
///
/// Returns `ControlError::Validation` listing the valid states if `target`
/// is not one of them.
pub fn parse_target(target: &str) -> Result<StepState> {
    target.parse().map_err(|_| {
        ControlError::Validation(format!(
            "unknown step state {target:?}, expected one of: {}",
            StepState::valid_values()
        ))
    })
}
