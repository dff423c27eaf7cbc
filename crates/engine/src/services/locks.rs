//! Per-instance exclusive sections.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Lock table keyed by instance ID.
///
/// Holding the guard returned by [`InstanceLocks::acquire`] serializes task
/// completions of one instance; different instances never contend.
#[derive(Clone, Default)]
pub struct InstanceLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the instance's exclusive section.
    pub async fn acquire(&self, instance_id: Uuid) -> OwnedMutexGuard<()> {
        // The map shard guard must be gone before awaiting the mutex.
        let lock = self.locks.entry(instance_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the entry for `instance_id` unless someone else still holds or
    /// waits on it.
    pub fn release(&self, instance_id: Uuid) {
        self.locks
            .remove_if(&instance_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
