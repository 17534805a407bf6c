//! Callback dispatch for watch sessions.

use jobflow_core::{ClusterId, StepId, StepState};
use tokio_util::sync::CancellationToken;

use crate::channel::Subscription;
use crate::error::Result;
use crate::lifecycle::{self, WatchPhase};

/// Callback run once when a watched step reaches its target state.
pub type OnState = Box<dyn FnOnce(StepState) + Send + 'static>;

/// How a dispatch session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The target state was observed and the callback ran.
    Matched {
        /// The matched state.
        state: StepState,
        /// States consumed, including the match.
        observations: usize,
    },
    /// The channel closed or the watch was cancelled first; the callback
    /// never ran.
    Closed {
        /// States consumed before the close.
        observations: usize,
    },
}

impl DispatchOutcome {
    /// Returns true if the callback ran.
    #[must_use]
    pub const fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Consumes a subscription and fires a callback on the target state.
#[derive(Debug)]
pub struct Listener {
    step_id: StepId,
    cluster_id: ClusterId,
    target: StepState,
    subscription: Subscription,
    cancel: CancellationToken,
}

impl Listener {
    /// Create a listener waiting for `target`.
    #[must_use]
    pub fn new(
        step_id: StepId,
        cluster_id: ClusterId,
        target: StepState,
        subscription: Subscription,
    ) -> Self {
        Self {
            step_id,
            cluster_id,
            target,
            subscription,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop consuming as soon as `cancel` fires, even if states are still
    /// buffered.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Consume states until the target is seen, the channel closes, or the
    /// watch is cancelled.
    ///
    /// The subscription is dropped on return, so the poller notices when no
    /// one is listening any more.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the session attempts a phase
    /// transition the state machine does not allow.
    pub async fn run(mut self, on_state: OnState) -> Result<DispatchOutcome> {
        let mut phase = WatchPhase::Watching;
        let mut observations = 0;

        while !phase.is_final() {
            let received = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                state = self.subscription.recv() => state,
            };

            let Some(state) = received else {
                phase = lifecycle::validate_transition(phase, phase.close())?;
                break;
            };
            observations += 1;
            phase = lifecycle::validate_transition(phase, phase.observe(state, self.target))?;

            if phase == WatchPhase::Matched {
                tracing::info!(
                    step_id = %self.step_id,
                    cluster_id = %self.cluster_id,
                    state = %state,
                    "Step reached target state"
                );
                on_state(state);
                return Ok(DispatchOutcome::Matched {
                    state,
                    observations,
                });
            }

            tracing::info!(
                step_id = %self.step_id,
                cluster_id = %self.cluster_id,
                state = %state,
                target = %self.target,
                "Step not yet in target state, waiting"
            );
        }

        tracing::warn!(
            step_id = %self.step_id,
            cluster_id = %self.cluster_id,
            target = %self.target,
            phase = ?phase,
            cancelled = self.cancel.is_cancelled(),
            "Watch ended before step reached target state"
        );
        Ok(DispatchOutcome::Closed { observations })
    }
}
