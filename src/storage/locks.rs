//! Per-collection async locks

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created async mutex per collection name
#[derive(Debug, Default)]
pub struct CollectionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CollectionLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `collection`
    pub async fn lock(&self, collection: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard is not held across the await
        let lock = self
            .locks
            .entry(collection.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Number of collections that have been locked at least once
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no collection has been locked yet
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
