use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{BackendError, DeleteStatus, StorageKey};

pub type BackendResult<T> = Result<T, BackendError>;

/// Read-modify-write step passed to [`Store::update`].
///
/// Receives the current value (if any) and returns the value to store, or
/// `None` to remove the record.
pub type UpdateFn<'a> = Box<dyn FnOnce(Option<Bytes>) -> Option<Bytes> + Send + 'a>;

/// Byte-level key/value storage shared by the cache and the rate limiter.
///
/// Values are opaque to the store. Implementations must make [`Store::update`]
/// atomic with respect to every other operation on the same key issued
/// through the same store instance.
#[async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, key: &StorageKey) -> BackendResult<Option<Bytes>>;

    async fn write(&self, key: &StorageKey, value: Bytes) -> BackendResult<()>;

    async fn remove(&self, key: &StorageKey) -> BackendResult<DeleteStatus>;

    /// Atomically replaces the value under `key` with the output of `update`.
    async fn update(&self, key: &StorageKey, update: UpdateFn<'_>) -> BackendResult<()>;

    /// Lists every key currently stored in `namespace`.
    async fn keys(&self, namespace: &str) -> BackendResult<Vec<StorageKey>>;

    /// Removes every record in `namespace` and returns how many were removed.
    async fn clear(&self, namespace: &str) -> BackendResult<u64>;

    /// Returns the name of this store for log output.
    fn name(&self) -> &str {
        "store"
    }
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn read(&self, key: &StorageKey) -> BackendResult<Option<Bytes>> {
        (**self).read(key).await
    }

    async fn write(&self, key: &StorageKey, value: Bytes) -> BackendResult<()> {
        (**self).write(key, value).await
    }

    async fn remove(&self, key: &StorageKey) -> BackendResult<DeleteStatus> {
        (**self).remove(key).await
    }

    async fn update(&self, key: &StorageKey, update: UpdateFn<'_>) -> BackendResult<()> {
        (**self).update(key, update).await
    }

    async fn keys(&self, namespace: &str) -> BackendResult<Vec<StorageKey>> {
        (**self).keys(namespace).await
    }

    async fn clear(&self, namespace: &str) -> BackendResult<u64> {
        (**self).clear(namespace).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
