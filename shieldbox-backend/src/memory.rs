//! In-process store backed by [`DashMap`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::{BackendResult, DeleteStatus, StorageKey, Store, UpdateFn};

/// Concurrent in-memory store.
///
/// Updates run under the map's shard lock, which makes
/// [`Store::update`] atomic for every caller sharing this store. Contents
/// do not survive a process restart; use `shieldbox_fs::FileStore` for that.
///
/// Cloning is cheap, clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    map: Arc<DashMap<StorageKey, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all namespaces.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Checks if a record exists, without any expiry interpretation.
    pub fn contains(&self, key: &StorageKey) -> bool {
        self.map.contains_key(key)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, key: &StorageKey) -> BackendResult<Option<Bytes>> {
        Ok(self.map.get(key).map(|value| value.clone()))
    }

    async fn write(&self, key: &StorageKey, value: Bytes) -> BackendResult<()> {
        self.map.insert(key.clone(), value);
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> BackendResult<DeleteStatus> {
        Ok(match self.map.remove(key) {
            Some(_) => DeleteStatus::Deleted(1),
            None => DeleteStatus::Missing,
        })
    }

    async fn update(&self, key: &StorageKey, update: UpdateFn<'_>) -> BackendResult<()> {
        match self.map.entry(key.clone()) {
            Entry::Occupied(mut entry) => match update(Some(entry.get().clone())) {
                Some(value) => {
                    entry.insert(value);
                }
                None => {
                    entry.remove();
                }
            },
            Entry::Vacant(entry) => {
                if let Some(value) = update(None) {
                    entry.insert(value);
                }
            }
        }
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> BackendResult<Vec<StorageKey>> {
        let namespace = crate::key::sanitize_namespace(namespace);
        Ok(self
            .map
            .iter()
            .filter(|entry| entry.key().namespace() == namespace.as_str())
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn clear(&self, namespace: &str) -> BackendResult<u64> {
        let namespace = crate::key::sanitize_namespace(namespace);
        let mut removed = 0;
        self.map.retain(|key, _| {
            let keep = key.namespace() != namespace.as_str();
            if !keep {
                removed += 1;
            }
            keep
        });
        trace!(namespace = namespace.as_str(), removed, "memory namespace cleared");
        Ok(removed)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_remove() {
        let store = MemoryStore::new();
        let key = StorageKey::hashed("ns", "key");

        store.write(&key, Bytes::from_static(b"value")).await.unwrap();
        assert_eq!(
            store.read(&key).await.unwrap(),
            Some(Bytes::from_static(b"value"))
        );

        assert_eq!(store.remove(&key).await.unwrap(), DeleteStatus::Deleted(1));
        assert_eq!(store.remove(&key).await.unwrap(), DeleteStatus::Missing);
        assert_eq!(store.read(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_inserts_replaces_and_removes() {
        let store = MemoryStore::new();
        let key = StorageKey::hashed("ns", "counter");

        store
            .update(&key, Box::new(|current| {
                assert!(current.is_none());
                Some(Bytes::from_static(b"1"))
            }))
            .await
            .unwrap();
        store
            .update(&key, Box::new(|current| {
                assert_eq!(current.as_deref(), Some(&b"1"[..]));
                Some(Bytes::from_static(b"2"))
            }))
            .await
            .unwrap();
        assert_eq!(store.read(&key).await.unwrap().as_deref(), Some(&b"2"[..]));

        store.update(&key, Box::new(|_| None)).await.unwrap();
        assert!(!store.contains(&key));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store = MemoryStore::new();
        let key = StorageKey::hashed("ns", "counter");

        let tasks = (0..64).map(|_| {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                store
                    .update(&key, Box::new(|current| {
                        let count: u64 = current
                            .and_then(|bytes| std::str::from_utf8(&bytes).ok()?.parse().ok())
                            .unwrap_or(0);
                        Some(Bytes::from((count + 1).to_string()))
                    }))
                    .await
                    .unwrap();
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        assert_eq!(store.read(&key).await.unwrap().as_deref(), Some(&b"64"[..]));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        store
            .write(&StorageKey::hashed("a", "1"), Bytes::from_static(b"x"))
            .await
            .unwrap();
        store
            .write(&StorageKey::hashed("a", "2"), Bytes::from_static(b"x"))
            .await
            .unwrap();
        store
            .write(&StorageKey::hashed("b", "1"), Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert_eq!(store.keys("a").await.unwrap().len(), 2);
        assert_eq!(store.clear("a").await.unwrap(), 2);
        assert!(store.keys("a").await.unwrap().is_empty());
        assert_eq!(store.keys("b").await.unwrap().len(), 1);
    }
}
