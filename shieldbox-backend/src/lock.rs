//! Per-key async locks.
//!
//! Serializes work on one [`StorageKey`] while leaving other keys untouched.
//! Used by file based stores for read-modify-write and by the cache to keep
//! concurrent `remember` calls from running the same producer twice.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::StorageKey;

/// Registry of in-flight per-key locks.
///
/// Cloning is cheap, clones share the registry.
#[derive(Clone, Debug, Default)]
pub struct KeyLocks {
    locks: Arc<DashMap<StorageKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the lock for `key` is free and takes it.
    pub async fn lock(&self, key: &StorageKey) -> KeyLockGuard {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyLockGuard {
            key: key.clone(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of keys with a registered lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Holds a key lock until dropped.
///
/// The registry entry is dropped together with the last guard or waiter.
#[derive(Debug)]
pub struct KeyLockGuard {
    key: StorageKey,
    locks: Arc<DashMap<StorageKey, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
