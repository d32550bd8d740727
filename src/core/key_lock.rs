//! Per-key async mutual exclusion
//!
//! Serializes read-modify-write sequences on the same key while letting
//! different keys proceed in parallel.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle locks are swept once this many keys are tracked
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
    acquisitions: AtomicUsize,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        if self.acquisitions.fetch_add(1, Ordering::Relaxed) % PRUNE_THRESHOLD == 0
            && self.locks.len() >= PRUNE_THRESHOLD
        {
            self.prune();
        }

        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on
    pub fn prune(&self) {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        log::trace!("Pruned {} idle key locks", before - self.locks.len());
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
