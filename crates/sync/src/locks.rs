//! Per-key serialization of remote operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// In-flight registry mapping a remote key to the operation holding it.
///
/// Requests touching the same key run one after the other; requests for
/// different keys never wait on each other. Entries are dropped as soon as
/// nobody holds or waits for them.
#[derive(Debug, Clone, Default)]
pub struct KeyLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Exclusive access to one key, released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    locks: KeyLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        // The map is only touched in short non-panicking sections.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no other operation holds `key`, then hold it.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = self.map().entry(key.to_string()).or_default().clone();
        if mutex.try_lock().is_err() {
            tracing::debug!(key, "Waiting for in-flight operation on key");
        }
        let guard = mutex.lock_owned().await;
        KeyGuard { key: key.to_string(), locks: self.clone(), guard: Some(guard) }
    }

    /// Number of keys currently held or waited for.
    pub fn in_flight(&self) -> usize {
        self.map().len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.map();
        if let Some(mutex) = map.get(&self.key)
            && Arc::strong_count(mutex) == 1
        {
            map.remove(&self.key);
        }
    }
}
