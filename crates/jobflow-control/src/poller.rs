//! Step lifecycle polling.
//!
//! A [`Poller`] queries a step at a fixed interval until it reaches a
//! terminal state, optionally publishing every observed state to a channel.

use std::time::Duration;

use jobflow_core::{ClusterId, StepId, StepState};
use tokio_util::sync::CancellationToken;

use crate::channel::Publisher;
use crate::error::{ControlError, Result};
use crate::normalizer::StatusNormalizer;

/// How a poll session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The step reached a terminal state, which was published last.
    Terminal(StepState),
    /// The cancellation token fired.
    Cancelled,
    /// Every subscription was dropped before the step finished.
    Abandoned,
}

/// Polls a step until it finishes.
#[derive(Clone)]
pub struct Poller {
    normalizer: StatusNormalizer,
    interval: Duration,
    max_failures: u32,
}

impl Poller {
    /// Create a poller.
    ///
    /// `max_failures` is the number of consecutive failed queries after
    /// which polling gives up.
    #[must_use]
    pub fn new(normalizer: StatusNormalizer, interval: Duration, max_failures: u32) -> Self {
        Self {
            normalizer,
            interval,
            max_failures,
        }
    }

    /// The polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until the step is terminal, publishing each observed state.
    ///
    /// The publisher is dropped when this returns, which closes the channel.
    ///
    /// # Errors
    ///
    /// Returns a query error that retrying cannot fix (such as an unknown
    /// step) at once, and any other after `max_failures` consecutive
    /// failures.
    pub async fn run(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        mut publisher: Option<Publisher>,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome> {
        let mut failures = 0u32;

        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                polled = self.normalizer.normalize(step_id, cluster_id) => polled,
            };

            match polled {
                Ok(status) => {
                    failures = 0;
                    let state = status.state();
                    tracing::debug!(
                        step_id = %step_id,
                        cluster_id = %cluster_id,
                        state = %state,
                        "Polled step"
                    );

                    if let Some(publisher) = publisher.as_mut() {
                        let published = tokio::select! {
                            biased;
                            () = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                            published = publisher.publish(state) => published,
                        };
                        if published.is_err() {
                            tracing::info!(
                                step_id = %step_id,
                                cluster_id = %cluster_id,
                                "Every listener went away, stopping poll"
                            );
                            return Ok(PollOutcome::Abandoned);
                        }
                    }

                    if state.is_terminal() {
                        return Ok(PollOutcome::Terminal(state));
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        step_id = %step_id,
                        cluster_id = %cluster_id,
                        attempt = failures,
                        max_failures = self.max_failures,
                        error = %e,
                        "Step poll failed"
                    );
                    if !e.is_retriable() || failures >= self.max_failures {
                        return Err(e);
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Wait until the step is terminal and return that state.
    ///
    /// # Errors
    ///
    /// Returns the last query error after `max_failures` consecutive
    /// failures.
    pub async fn await_terminal(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepState> {
        self.await_terminal_until(step_id, cluster_id, &CancellationToken::new())
            .await?
            .ok_or_else(|| ControlError::Internal("uncancellable wait was cancelled".to_string()))
    }

    /// Like [`Self::await_terminal`], returning `None` if `cancel` fires first.
    ///
    /// # Errors
    ///
    /// Returns the last query error after `max_failures` consecutive
    /// failures.
    pub async fn await_terminal_until(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        cancel: &CancellationToken,
    ) -> Result<Option<StepState>> {
        match self.run(step_id, cluster_id, None, cancel).await? {
            PollOutcome::Terminal(state) => Ok(Some(state)),
            PollOutcome::Cancelled => Ok(None),
            PollOutcome::Abandoned => Err(ControlError::Internal(
                "poll without listeners was abandoned".to_string(),
            )),
        }
    }
}
