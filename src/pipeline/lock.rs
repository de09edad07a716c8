//! Keyed mutual exclusion: at most one holder per key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock table keyed by saved-search id.
///
/// Entries are created on demand and dropped once no guard or waiter
/// references them, so the table only holds ids with a run in flight.
#[derive(Debug, Default, Clone)]
pub struct KeyedLocks {
    slots: Arc<Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>>,
}

/// Held while a run for `key` is in progress.
#[derive(Debug)]
pub struct KeyGuard {
    key: u64,
    slots: Arc<Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: u64) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key).or_default().clone()
    }

    /// Wait until `key` is free, then hold it.
    pub async fn acquire(&self, key: u64) -> KeyGuard {
        let guard = self.slot(key).lock_owned().await;
        self.guard(key, guard)
    }

    /// Hold `key` only if nobody else does.
    pub fn try_acquire(&self, key: u64) -> Option<KeyGuard> {
        let slot = self.slot(key);
        match slot.try_lock_owned() {
            Ok(guard) => Some(self.guard(key, guard)),
            Err(_) => None,
        }
    }

    pub fn is_locked(&self, key: u64) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(&key).is_some_and(|slot| slot.try_lock().is_err())
    }

    fn guard(&self, key: u64, guard: OwnedMutexGuard<()>) -> KeyGuard {
        KeyGuard {
            key,
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the strong count below reflects only the table and waiters.
        self.guard.take();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.key);
            }
        }
    }
}
