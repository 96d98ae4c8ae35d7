//! Arena of per-edge async locks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per edge id, created on first use.
///
/// The guard is held across store round trips, so the inner lock is a
/// tokio mutex; the map itself is only touched briefly.
///
/// Entries are never evicted. The map grows to one entry per edge seen,
/// which the catalog bounds.
#[derive(Debug, Default)]
pub struct EdgeLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EdgeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one edge.
    pub async fn acquire(&self, edge_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(edge_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of edges that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
