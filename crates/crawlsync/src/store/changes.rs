//! Change notifications published by the job store.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::record::{JobId, JobStatus};

/// A state change that has just been applied to the store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreChange {
    /// The whole table was replaced by a bulk load.
    Replaced { count: usize },
    /// One record was inserted or updated.
    Upserted { id: JobId, status: JobStatus },
    /// Records were removed after a deletion was acknowledged.
    Removed { ids: Vec<JobId> },
}

/// Broadcasts store changes to any number of subscribers.
#[derive(Clone)]
pub struct ChangeBroadcaster {
    sender: broadcast::Sender<StoreChange>,
}

impl ChangeBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends a change to all subscribers.
    pub fn send(&self, change: StoreChange) {
        // No active receivers is fine
        let _ = self.sender.send(change);
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.sender.subscribe()
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
