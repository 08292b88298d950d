use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::CohortKey;

/// Async mutex per key, held across a read-modify-write inside this process.
/// Separate processes writing the same key are not coordinated.
pub struct KeyedLocks<K> {
    inner: Arc<Mutex<HashMap<K, Arc<Mutex<()>>>>>,
}

/// Serializes score writes and re-ranks per (subject, term)
pub type CohortLocks = KeyedLocks<CohortKey>;

/// Serializes status transitions per attempt id
pub type AttemptLocks = KeyedLocks<String>;

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}
