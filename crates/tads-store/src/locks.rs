use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::OwnedMutexGuard;

use crate::error::StoreError;

/// Per-session async write locks.
///
/// Writers holding the guard for a session are serialized; other sessions
/// proceed independently. Entries are dropped once no guard references them.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<i64, Weak<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `session_id`.
    pub async fn lock(&self, session_id: i64) -> Result<OwnedMutexGuard<()>, StoreError> {
        let mutex = {
            let mut map = self
                .inner
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("session lock table poisoned: {e}")))?;
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(&session_id).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(tokio::sync::Mutex::new(()));
                    map.insert(session_id, Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        Ok(mutex.lock_owned().await)
    }

    /// Number of sessions with a live lock.
    pub fn active(&self) -> usize {
        self.inner
            .lock()
            .map(|map| map.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}
