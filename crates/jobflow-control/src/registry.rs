//! Registry of active watches.
//!
//! Tracks every running watch session with its cancellation token so that
//! watches can be listed and cancelled, and remembers which clusters this
//! process asked to terminate.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use jobflow_core::{ClusterId, StepId, StepState, WatchId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Public view of an active watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchInfo {
    /// Watch identifier.
    pub id: WatchId,
    /// Watched step.
    pub step_id: StepId,
    /// Cluster owning the step.
    pub cluster_id: ClusterId,
    /// State the watch waits for; `None` for a peek.
    pub target: Option<StepState>,
    /// When the watch started.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct WatchEntry {
    info: WatchInfo,
    cancel: CancellationToken,
}

/// Shared registry of active watches.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watches: Mutex<HashMap<WatchId, WatchEntry>>,
    termination_requested: Mutex<HashSet<ClusterId>>,
}

impl WatchRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new watch and return its id and cancellation token.
    pub fn register(
        &self,
        step_id: StepId,
        cluster_id: ClusterId,
        target: Option<StepState>,
    ) -> (WatchId, CancellationToken) {
        let id = WatchId::generate();
        let cancel = CancellationToken::new();
        let entry = WatchEntry {
            info: WatchInfo {
                id,
                step_id,
                cluster_id,
                target,
                started_at: Utc::now(),
            },
            cancel: cancel.clone(),
        };
        self.watches.lock().insert(id, entry);
        (id, cancel)
    }

    /// Remove a finished watch.
    pub fn remove(&self, id: &WatchId) -> Option<WatchInfo> {
        self.watches.lock().remove(id).map(|entry| entry.info)
    }

    /// Cancel and remove a watch. Returns false if it was not active.
    pub fn cancel(&self, id: &WatchId) -> bool {
        let entry = self.watches.lock().remove(id);
        entry.is_some_and(|entry| {
            entry.cancel.cancel();
            true
        })
    }

    /// Cancel and remove every watch, returning how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<WatchEntry> = self.watches.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.cancel.cancel();
        }
        drained.len()
    }

    /// Snapshot of every active watch, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<WatchInfo> {
        let mut watches: Vec<WatchInfo> = self
            .watches
            .lock()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        watches.sort_by_key(|info| info.started_at);
        watches
    }

    /// Record that termination of a cluster was requested.
    pub fn mark_termination_requested(&self, cluster_id: ClusterId) {
        self.termination_requested.lock().insert(cluster_id);
    }

    /// Check if termination of a cluster was requested.
    #[must_use]
    pub fn termination_requested(&self, cluster_id: &ClusterId) -> bool {
        self.termination_requested.lock().contains(cluster_id)
    }
}
