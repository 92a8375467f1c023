//! Per-item write serialization.
//!
//! Writes to the same evidence item take its mutex, so a log append and the
//! matching record update are never interleaved with another writer's.
//! Writes to different items, and all reads, proceed without coordination.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of one async mutex per evidence ID
#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to an item
    pub async fn acquire(&self, evidence_id: &str) -> ItemGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(evidence_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        ItemGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of items currently tracked
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held while writing to one item; releases on drop
pub struct ItemGuard {
    _guard: OwnedMutexGuard<()>,
}
