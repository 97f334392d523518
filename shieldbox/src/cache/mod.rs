//! Namespaced key/value cache with per-entry expiry.
//!
//! Logical keys are hashed into a [`StorageKey`], so any string is a valid
//! key. Values are stored as a [`CacheEntry`] envelope; typed values go
//! through JSON inside that envelope.
//!
//! Read problems never reach the caller. A missing, expired or undecodable
//! entry is a miss, and the last two are removed from the store on the way
//! out. Write failures are logged and swallowed.

mod entry;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shieldbox_backend::{Clock, KeyLocks, StorageKey, Store, SystemClock};
use shieldbox_config::ShieldConfig;
use tracing::{debug, trace, warn};

pub use entry::CacheEntry;

use crate::sweep::should_sweep;

/// TTL cache over any [`Store`].
///
/// Cloning is cheap: clones share the store, the clock and the
/// single-flight locks.
pub struct TtlCache<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: Arc<ShieldConfig>,
    locks: KeyLocks,
}

impl<S> Clone for TtlCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
            locks: self.locks.clone(),
        }
    }
}

impl<S> fmt::Debug for TtlCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("clock", &self.clock)
            .field("default_ttl", &self.config.cache.default_ttl)
            .finish_non_exhaustive()
    }
}

impl<S> TtlCache<S>
where
    S: Store,
{
    pub fn new(store: S, config: Arc<ShieldConfig>) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: Arc<ShieldConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(store),
            clock,
            config,
            locks: KeyLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.cache.default_ttl
    }

    /// TTL configured for a resource type, e.g. `"news"` or `"cve"`.
    pub fn ttl_for(&self, resource_type: &str) -> Duration {
        self.config.cache_ttl(resource_type)
    }

    /// Returns the raw bytes stored under `key`, if present and fresh.
    pub async fn get_raw(&self, namespace: &str, key: &str) -> Option<Bytes> {
        let key = StorageKey::hashed(namespace, key);
        self.lookup(&key).await.map(|(_, entry)| entry.into_value())
    }

    /// Stores raw bytes for `ttl`, or the default TTL when `None`.
    ///
    /// Returns whether the entry was written. A zero TTL stores nothing.
    pub async fn set_raw(
        &self,
        namespace: &str,
        key: &str,
        value: impl Into<Bytes>,
        ttl: Option<Duration>,
    ) -> bool {
        let key = StorageKey::hashed(namespace, key);
        self.store_value(&key, value.into(), ttl).await
    }

    pub async fn get<T>(&self, namespace: &str, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.get_by_key(&StorageKey::hashed(namespace, key)).await
    }

    pub async fn set<T>(&self, namespace: &str, key: &str, value: &T, ttl: Option<Duration>) -> bool
    where
        T: Serialize + ?Sized,
    {
        self.set_by_key(&StorageKey::hashed(namespace, key), value, ttl)
            .await
    }

    /// Removes an entry. Deleting a missing key is a no-op.
    pub async fn delete(&self, namespace: &str, key: &str) {
        let key = StorageKey::hashed(namespace, key);
        match self.store.remove(&key).await {
            Ok(status) => trace!(%key, ?status, "cache delete"),
            Err(error) => warn!(%key, %error, "cache delete failed"),
        }
    }

    /// Removes every entry in `namespace` and returns how many were removed.
    pub async fn clear(&self, namespace: &str) -> u64 {
        match self.store.clear(namespace).await {
            Ok(removed) => {
                debug!(namespace, removed, "cache namespace cleared");
                removed
            }
            Err(error) => {
                warn!(namespace, %error, "cache clear failed");
                0
            }
        }
    }

    /// Returns the cached value, or runs `producer` once, caches its output
    /// and returns it.
    ///
    /// Concurrent calls for the same key within this cache (and its clones)
    /// share one producer run: the others wait and read the stored value.
    pub async fn remember<T, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let key = StorageKey::hashed(namespace, key);
        if let Some(value) = self.get_by_key(&key).await {
            return value;
        }

        let _guard = self.locks.lock(&key).await;
        if let Some(value) = self.get_by_key(&key).await {
            trace!(%key, "value produced by a concurrent caller");
            return value;
        }

        let value = producer().await;
        self.set_by_key(&key, &value, ttl).await;
        value
    }

    /// Like [`TtlCache::remember`], but the producer may fail.
    ///
    /// Errors are returned as is and nothing is cached.
    pub async fn try_remember<T, E, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = StorageKey::hashed(namespace, key);
        if let Some(value) = self.get_by_key(&key).await {
            return Ok(value);
        }

        let _guard = self.locks.lock(&key).await;
        if let Some(value) = self.get_by_key(&key).await {
            return Ok(value);
        }

        let value = producer().await?;
        self.set_by_key(&key, &value, ttl).await;
        Ok(value)
    }

    /// Removes expired and undecodable entries from `namespace`.
    ///
    /// Returns the number of removed entries.
    pub async fn purge_expired(&self, namespace: &str) -> u64 {
        let keys = match self.store.keys(namespace).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(namespace, %error, "cache sweep failed to list keys");
                return 0;
            }
        };

        let now = self.clock.now();
        let mut removed = 0;
        for key in keys {
            let payload = match self.store.read(&key).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(error) => {
                    warn!(%key, %error, "cache sweep failed to read entry");
                    continue;
                }
            };
            let stale = CacheEntry::decode(&payload).is_none_or(|entry| entry.is_expired(now));
            if stale && self.discard(&key, payload).await {
                removed += 1;
            }
        }
        debug!(namespace, removed, "cache sweep finished");
        removed
    }

    async fn get_by_key<T>(&self, key: &StorageKey) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let (payload, entry) = self.lookup(key).await?;
        match serde_json::from_slice(entry.value()) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(%key, %error, "cached value has unexpected shape, dropping it");
                self.discard(key, payload).await;
                None
            }
        }
    }

    async fn set_by_key<T>(&self, key: &StorageKey, value: &T, ttl: Option<Duration>) -> bool
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(value) {
            Ok(value) => self.store_value(key, Bytes::from(value), ttl).await,
            Err(error) => {
                warn!(%key, %error, "failed to serialize value for caching");
                false
            }
        }
    }

    /// Reads a fresh entry, returning it with the payload it was decoded from.
    async fn lookup(&self, key: &StorageKey) -> Option<(Bytes, CacheEntry)> {
        let payload = match self.store.read(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(%key, "cache miss");
                return None;
            }
            Err(error) => {
                warn!(%key, %error, store = self.store.name(), "cache read failed");
                return None;
            }
        };

        let Some(entry) = CacheEntry::decode(&payload) else {
            warn!(%key, "corrupted cache entry, dropping it");
            self.discard(key, payload).await;
            return None;
        };

        if entry.is_expired(self.clock.now()) {
            debug!(%key, expires_at = %entry.expires_at(), "cache entry expired");
            self.discard(key, payload).await;
            return None;
        }

        debug!(%key, "cache hit");
        Some((payload, entry))
    }

    async fn store_value(&self, key: &StorageKey, value: Bytes, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.config.cache.default_ttl);
        if ttl.is_zero() {
            warn!(%key, "refusing to cache with a zero ttl");
            return false;
        }

        let Some(payload) =
            CacheEntry::new(value, self.clock.now(), ttl).and_then(|entry| entry.encode())
        else {
            warn!(%key, ?ttl, "failed to encode cache entry");
            return false;
        };

        if let Err(error) = self.store.write(key, payload).await {
            warn!(%key, %error, store = self.store.name(), "cache write failed");
            return false;
        }
        trace!(%key, ?ttl, "cache entry stored");

        if should_sweep(self.config.storage.sweep_probability) {
            self.purge_expired(key.namespace()).await;
        }
        true
    }

    /// Removes `key` only if it still holds `observed`.
    ///
    /// A concurrent writer may have replaced a stale entry with a fresh one
    /// between our read and this call; that entry is kept.
    async fn discard(&self, key: &StorageKey, observed: Bytes) -> bool {
        let mut removed = false;
        let result = self
            .store
            .update(
                key,
                Box::new(|current: Option<Bytes>| match current {
                    Some(current) if current != observed => Some(current),
                    Some(_) => {
                        removed = true;
                        None
                    }
                    None => None,
                }),
            )
            .await;
        if let Err(error) = result {
            warn!(%key, %error, "failed to drop stale cache entry");
            return false;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use shieldbox_backend::{ManualClock, MemoryStore};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Headline {
        title: String,
        score: u32,
    }

    fn cache() -> (TtlCache<MemoryStore>, ManualClock) {
        let clock = ManualClock::default();
        let mut config = ShieldConfig::default();
        config.storage.sweep_probability = 0.0;
        let cache = TtlCache::with_clock(
            MemoryStore::new(),
            Arc::new(config),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _) = cache();
        let headline = Headline {
            title: "kernel release".to_owned(),
            score: 7,
        };

        assert!(cache.set("news", "latest", &headline, None).await);
        assert_eq!(cache.get("news", "latest").await, Some(headline));
        assert_eq!(cache.get::<Headline>("news", "other").await, None);
        assert_eq!(cache.get::<Headline>("cve", "latest").await, None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (cache, clock) = cache();
        cache
            .set("ns", "k", &"v", Some(Duration::from_secs(10)))
            .await;

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get::<String>("ns", "k").await.as_deref(), Some("v"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get::<String>("ns", "k").await, None);
        assert!(cache.store().is_empty(), "expired entry should be removed");
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let (cache, clock) = cache();
        cache.set_raw("ns", "k", "raw", None).await;

        clock.advance(cache.default_ttl());
        assert_eq!(cache.get_raw("ns", "k").await, Some(Bytes::from("raw")));
        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get_raw("ns", "k").await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let (cache, _) = cache();
        assert!(!cache.set("ns", "k", &1u32, Some(Duration::ZERO)).await);
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_dropped() {
        let (cache, _) = cache();
        let key = StorageKey::hashed("ns", "k");
        cache
            .store()
            .write(&key, Bytes::from_static(b"definitely not an entry"))
            .await
            .unwrap();

        assert_eq!(cache.get_raw("ns", "k").await, None);
        assert!(!cache.store().contains(&key));
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_dropped() {
        let (cache, _) = cache();
        cache.set("ns", "k", &"not a number", None).await;

        assert_eq!(cache.get::<u32>("ns", "k").await, None);
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (cache, _) = cache();
        cache.set("ns", "k", &1u32, None).await;

        cache.delete("ns", "k").await;
        cache.delete("ns", "k").await;
        cache.delete("ns", "never-set").await;

        assert_eq!(cache.get::<u32>("ns", "k").await, None);
    }

    #[tokio::test]
    async fn test_clear_only_touches_namespace() {
        let (cache, _) = cache();
        cache.set("news", "a", &1u32, None).await;
        cache.set("news", "b", &2u32, None).await;
        cache.set("cve", "a", &3u32, None).await;

        assert_eq!(cache.clear("news").await, 2);
        assert_eq!(cache.get::<u32>("news", "a").await, None);
        assert_eq!(cache.get::<u32>("cve", "a").await, Some(3));
    }

    #[tokio::test]
    async fn test_remember_calls_producer_once() {
        let (cache, clock) = cache();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let produce = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            vec![1u32, 2, 3]
        };

        let first = cache.remember("ns", "k", None, produce).await;
        let second = cache.remember("ns", "k", None, produce).await;
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(cache.default_ttl() + Duration::from_secs(1));
        cache.remember("ns", "k", None, produce).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_remember_is_single_flight() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16).map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .remember("ns", "slow", None, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        "expensive".to_owned()
                    })
                    .await
            })
        });

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap(), "expensive");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_try_remember_does_not_cache_errors() {
        let (cache, _) = cache();

        let failed: Result<u32, &str> = cache
            .try_remember("ns", "k", None, || async { Err("upstream down") })
            .await;
        assert_eq!(failed, Err("upstream down"));
        assert!(cache.store().is_empty());

        let ok: Result<u32, &str> = cache
            .try_remember("ns", "k", None, || async { Ok(5) })
            .await;
        assert_eq!(ok, Ok(5));
        assert_eq!(cache.get::<u32>("ns", "k").await, Some(5));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (cache, clock) = cache();
        cache
            .set("ns", "short", &1u32, Some(Duration::from_secs(5)))
            .await;
        cache
            .set("ns", "long", &2u32, Some(Duration::from_secs(500)))
            .await;
        cache
            .set("other", "short", &3u32, Some(Duration::from_secs(5)))
            .await;

        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.purge_expired("ns").await, 1);
        assert_eq!(cache.store().len(), 2);
        assert_eq!(cache.get::<u32>("ns", "long").await, Some(2));
    }

    #[tokio::test]
    async fn test_sweep_on_write() {
        let clock = ManualClock::default();
        let mut config = ShieldConfig::default();
        config.storage.sweep_probability = 1.0;
        let cache = TtlCache::with_clock(
            MemoryStore::new(),
            Arc::new(config),
            Arc::new(clock.clone()),
        );

        cache
            .set("ns", "old", &1u32, Some(Duration::from_secs(1)))
            .await;
        clock.advance(Duration::from_secs(2));
        cache.set("ns", "new", &2u32, None).await;

        assert_eq!(cache.store().len(), 1);
    }
}
