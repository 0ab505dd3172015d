//! Per-identifier async locks.
//!
//! Processing a document is check-cache → run pipeline → commit, and two
//! concurrent runs for the same path would both pass the check. Holding the
//! identifier's lock for the whole sequence serialises them; different
//! identifiers never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one identifier's critical section.
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`, creating its lock on first use.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on so the map stays small.
            slots.retain(|k, m| k == key || Arc::strong_count(m) > 1);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        KeyGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of identifiers with a live lock slot.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
