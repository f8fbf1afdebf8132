use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use socra_core::session::SessionKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per session key so requests for the same session run one
/// at a time while different sessions proceed in parallel.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poison| poison.into_inner());
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Whether a request currently holds the lock for `key`.
    pub fn is_busy(&self, key: &SessionKey) -> bool {
        self.locks
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(key)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Drop lock entries nobody is holding or waiting on.
    pub fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|poison| poison.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }
}
