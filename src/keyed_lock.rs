//! One async mutex per key, created on demand and dropped again once nobody
//! holds or waits for it.
//!
//! The engine serializes work per address with it, and the enforcer
//! serializes rule commands per IP without holding its index lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

type Table<K> = HashMap<K, Arc<tokio::sync::Mutex<()>>>;

#[derive(Debug)]
pub(crate) struct KeyedLocks<K> {
    locks: Mutex<Table<K>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn table(&self) -> MutexGuard<'_, Table<K>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let mutex = Arc::clone(self.table().entry(key.clone()).or_default());
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table().len()
    }
}

pub(crate) struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        let mut table = self.locks.table();
        // Release first so the count below only sees the table and waiters
        drop(self.guard.take());
        if table.get(&self.key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
            table.remove(&self.key);
        }
    }
}
