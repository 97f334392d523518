use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use shieldbox_backend::{
    BackendResult, DeleteStatus, KeyLocks, StorageKey, Store, UpdateFn, key::sanitize_namespace,
};
use tokio::fs;

use crate::FileStoreError;

const RECORD_EXTENSION: &str = "bin";
const TEMP_EXTENSION: &str = "tmp";

/// Disk-based store, one file per record.
///
/// Use this when cache entries and rate windows must survive restarts.
/// For pure speed without persistence, prefer `MemoryStore`.
///
/// Layout: `<root>/<namespace>/<digest>.bin`. Writes go to a temporary file
/// that is renamed over the record, so readers never see a torn record.
///
/// ```no_run
/// use shieldbox_fs::FileStore;
///
/// let cache = FileStore::builder()
///     .path("/var/lib/portfolio/cache")
///     .build()?;
/// # Ok::<(), shieldbox_fs::FileStoreError>(())
/// ```
///
/// Cloning is cheap, clones share the same root and the same key locks.
/// Per-key atomicity of [`Store::update`] holds for all clones of one
/// store; two stores opened separately on the same root, or two processes,
/// do not coordinate.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: Arc<PathBuf>,
    locks: KeyLocks,
    label: String,
}

impl FileStore {
    /// Starts building a new store.
    pub fn builder() -> FileStoreBuilder {
        FileStoreBuilder::default()
    }

    /// Opens (and creates if needed) a store rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FileStoreError> {
        Self::builder().path(path).build()
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the file holding `key`.
    pub fn record_path(&self, key: &StorageKey) -> PathBuf {
        self.root
            .join(key.namespace())
            .join(format!("{}.{RECORD_EXTENSION}", key.digest()))
    }

    fn temp_path(&self, key: &StorageKey) -> PathBuf {
        self.root
            .join(key.namespace())
            .join(format!("{}.{TEMP_EXTENSION}", key.digest()))
    }

    async fn read_record(&self, key: &StorageKey) -> std::io::Result<Option<Bytes>> {
        match fs::read(self.record_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    // Callers must hold the key lock.
    async fn write_record(&self, key: &StorageKey, value: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(self.root.join(key.namespace())).await?;
        let temp = self.temp_path(key);
        fs::write(&temp, value).await?;
        fs::rename(&temp, self.record_path(key)).await
    }

    // Callers must hold the key lock.
    async fn remove_record(&self, key: &StorageKey) -> std::io::Result<DeleteStatus> {
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(DeleteStatus::Deleted(1)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(DeleteStatus::Missing),
            Err(error) => Err(error),
        }
    }
}

/// Builder for [`FileStore`].
#[derive(Debug)]
pub struct FileStoreBuilder {
    path: Option<PathBuf>,
    label: String,
}

impl Default for FileStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            label: "fs".to_owned(),
        }
    }
}

impl FileStoreBuilder {
    /// Root directory of the store. Required.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Identifies this store in log output.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Creates the store.
    ///
    /// Fails if no path was given or the root can't be created.
    pub fn build(self) -> Result<FileStore, FileStoreError> {
        let root = self
            .path
            .ok_or_else(|| FileStoreError::InvalidConfig("path is required".to_owned()))?;
        std::fs::create_dir_all(&root)?;
        if !root.is_dir() {
            return Err(FileStoreError::InvalidConfig(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        tracing::debug!(root = %root.display(), label = %self.label, "file store opened");

        Ok(FileStore {
            root: Arc::new(root),
            locks: KeyLocks::new(),
            label: self.label,
        })
    }
}

#[async_trait]
impl Store for FileStore {
    async fn read(&self, key: &StorageKey) -> BackendResult<Option<Bytes>> {
        Ok(self.read_record(key).await?)
    }

    async fn write(&self, key: &StorageKey, value: Bytes) -> BackendResult<()> {
        let _guard = self.locks.lock(key).await;
        Ok(self.write_record(key, &value).await?)
    }

    async fn remove(&self, key: &StorageKey) -> BackendResult<DeleteStatus> {
        let _guard = self.locks.lock(key).await;
        Ok(self.remove_record(key).await?)
    }

    async fn update(&self, key: &StorageKey, update: UpdateFn<'_>) -> BackendResult<()> {
        let _guard = self.locks.lock(key).await;
        let current = self.read_record(key).await?;
        let existed = current.is_some();
        match update(current) {
            Some(value) => self.write_record(key, &value).await?,
            None if existed => {
                self.remove_record(key).await?;
            }
            None => {}
        }
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> BackendResult<Vec<StorageKey>> {
        let namespace = sanitize_namespace(namespace);
        let mut entries = match fs::read_dir(self.root.join(namespace.as_str())).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| StorageKey::from_digest(&namespace, stem))
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn clear(&self, namespace: &str) -> BackendResult<u64> {
        let mut removed = 0;
        for key in self.keys(namespace).await? {
            let _guard = self.locks.lock(&key).await;
            if let DeleteStatus::Deleted(count) = self.remove_record(&key).await? {
                removed += u64::from(count);
            }
        }
        Ok(removed)
    }

    fn name(&self) -> &str {
        &self.label
    }
}
