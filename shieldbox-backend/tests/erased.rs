use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use shieldbox_backend::{
    BackendResult, DeleteStatus, MemoryStore, StorageKey, Store, UpdateFn, key::sanitize_namespace,
};
use tokio::sync::RwLock;

/// Minimal third-party store: one lock around a map.
#[derive(Debug, Default)]
struct MapStore {
    storage: RwLock<HashMap<StorageKey, Bytes>>,
}

#[async_trait]
impl Store for MapStore {
    async fn read(&self, key: &StorageKey) -> BackendResult<Option<Bytes>> {
        Ok(self.storage.read().await.get(key).cloned())
    }

    async fn write(&self, key: &StorageKey, value: Bytes) -> BackendResult<()> {
        self.storage.write().await.insert(key.clone(), value);
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> BackendResult<DeleteStatus> {
        Ok(match self.storage.write().await.remove(key) {
            Some(_) => DeleteStatus::Deleted(1),
            None => DeleteStatus::Missing,
        })
    }

    async fn update(&self, key: &StorageKey, update: UpdateFn<'_>) -> BackendResult<()> {
        let mut lock = self.storage.write().await;
        if let Some(value) = update(lock.remove(key)) {
            lock.insert(key.clone(), value);
        }
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> BackendResult<Vec<StorageKey>> {
        let namespace = sanitize_namespace(namespace);
        Ok(self
            .storage
            .read()
            .await
            .keys()
            .filter(|key| key.namespace() == namespace.as_str())
            .cloned()
            .collect())
    }

    async fn clear(&self, namespace: &str) -> BackendResult<u64> {
        let namespace = sanitize_namespace(namespace);
        let mut lock = self.storage.write().await;
        let before = lock.len();
        lock.retain(|key, _| key.namespace() != namespace.as_str());
        Ok((before - lock.len()) as u64)
    }

    fn name(&self) -> &str {
        "map"
    }
}

async fn exercise(store: Arc<dyn Store>) {
    let key = StorageKey::hashed("news", "front-page");

    assert_eq!(store.read(&key).await.unwrap(), None);
    store.write(&key, Bytes::from_static(b"1")).await.unwrap();

    store
        .update(
            &key,
            Box::new(|current: Option<Bytes>| {
                let count: u32 = current
                    .and_then(|value| std::str::from_utf8(&value).ok()?.parse().ok())
                    .unwrap_or(0);
                Some(Bytes::from((count + 1).to_string()))
            }),
        )
        .await
        .unwrap();
    assert_eq!(store.read(&key).await.unwrap().as_deref(), Some(&b"2"[..]));

    assert_eq!(store.keys("news").await.unwrap(), vec![key.clone()]);
    assert!(store.keys("cve").await.unwrap().is_empty());

    assert_eq!(store.remove(&key).await.unwrap(), DeleteStatus::Deleted(1));
    assert_eq!(store.remove(&key).await.unwrap(), DeleteStatus::Missing);
}

#[tokio::test]
async fn test_custom_store_behind_trait_object() {
    let store: Arc<dyn Store> = Arc::new(MapStore::default());
    assert_eq!(store.name(), "map");
    exercise(store).await;
}

#[tokio::test]
async fn test_memory_store_behind_trait_object() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    assert_eq!(store.name(), "memory");
    exercise(store).await;
}

#[tokio::test]
async fn test_nested_arc_is_a_store() {
    let inner: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let outer = Arc::new(Arc::clone(&inner));
    let key = StorageKey::hashed("ns", "k");

    outer.write(&key, Bytes::from_static(b"v")).await.unwrap();
    assert_eq!(inner.read(&key).await.unwrap().as_deref(), Some(&b"v"[..]));
    assert_eq!(outer.clear("ns").await.unwrap(), 1);
}
