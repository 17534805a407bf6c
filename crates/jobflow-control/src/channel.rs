//! Fan-out channel carrying observed step states.
//!
//! A [`Publisher`] delivers every state to each of its [`Subscription`]s in
//! FIFO order, through one bounded buffer per subscription. Publishing waits
//! for buffer space; nothing is dropped. Dropping the publisher closes every
//! subscription once its buffer drains.

use jobflow_core::StepState;
use thiserror::Error;
use tokio::sync::mpsc;

/// Returned by [`Publisher::publish`] once every subscription is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("every subscription has been dropped")]
pub struct NoSubscribers;

/// Create a channel with one initial subscription.
///
/// A capacity of zero is raised to one.
#[must_use]
pub fn channel(capacity: usize) -> (Publisher, Subscription) {
    let mut publisher = Publisher {
        senders: Vec::new(),
        capacity: capacity.max(1),
    };
    let subscription = publisher.subscribe();
    (publisher, subscription)
}

/// Send half. Owned by exactly one poller.
#[derive(Debug)]
pub struct Publisher {
    senders: Vec<mpsc::Sender<StepState>>,
    capacity: usize,
}

impl Publisher {
    /// Add a subscription. It receives only states published from now on.
    pub fn subscribe(&mut self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.senders.push(sender);
        Subscription { receiver }
    }

    /// Deliver a state to every subscription, waiting for buffer space.
    ///
    /// Subscriptions dropped since the last publish are detached. Cancelling
    /// the returned future keeps every subscription attached.
    ///
    /// # Errors
    ///
    /// Returns [`NoSubscribers`] if no subscription received the state.
    pub async fn publish(&mut self, state: StepState) -> Result<(), NoSubscribers> {
        let mut detached = false;
        for sender in &self.senders {
            if sender.send(state).await.is_err() {
                detached = true;
            }
        }
        if detached {
            self.senders.retain(|sender| !sender.is_closed());
        }

        if self.senders.is_empty() {
            Err(NoSubscribers)
        } else {
            Ok(())
        }
    }
}

/// Receive half. Owned by exactly one listener.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<StepState>,
}

impl Subscription {
    /// Wait for the next state; `None` once the publisher is gone and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<StepState> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_order_then_closes() {
        let (mut publisher, mut sub) = channel(4);
        publisher.publish(StepState::Pending).await.unwrap();
        publisher.publish(StepState::Running).await.unwrap();
        publisher.publish(StepState::Completed).await.unwrap();
        drop(publisher);

        assert_eq!(sub.recv().await, Some(StepState::Pending));
        assert_eq!(sub.recv().await, Some(StepState::Running));
        assert_eq!(sub.recv().await, Some(StepState::Completed));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn fans_out_to_every_subscription() {
        let (mut publisher, mut first) = channel(2);
        let mut second = publisher.subscribe();

        publisher.publish(StepState::Running).await.unwrap();
        drop(publisher);

        assert_eq!(first.recv().await, Some(StepState::Running));
        assert_eq!(second.recv().await, Some(StepState::Running));
        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_detached() {
        let (mut publisher, first) = channel(2);
        let mut second = publisher.subscribe();
        drop(first);

        publisher.publish(StepState::Running).await.unwrap();
        assert_eq!(second.recv().await, Some(StepState::Running));

        drop(second);
        assert_eq!(
            publisher.publish(StepState::Completed).await,
            Err(NoSubscribers)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn publish_waits_for_capacity() {
        let (mut publisher, mut sub) = channel(1);
        publisher.publish(StepState::Pending).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_secs(1), publisher.publish(StepState::Running))
                .await;
        assert!(blocked.is_err(), "publish should wait while the buffer is full");

        assert_eq!(sub.recv().await, Some(StepState::Pending));
        publisher.publish(StepState::Completed).await.unwrap();
        assert_eq!(sub.recv().await, Some(StepState::Completed));
    }

    #[test]
    fn zero_capacity_is_raised() {
        let (publisher, _sub) = channel(0);
        assert_eq!(publisher.capacity, 1);
    }
}
