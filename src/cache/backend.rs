use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{CatalogError, Result};

// Key prefixes, no trailing slashes
pub const CACHE_PREFIX: &str = "cache";
pub const BOOKMARK_PREFIX: &str = "bookmarks";

/// Raw key/value store underneath the cache and bookmarks.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put_raw(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// On-disk backend on top of cnidarium.
pub struct StorageBackend {
    storage: Storage,
    /// Commits must be serialized: a delta built on a stale snapshot is rejected.
    write_lock: Mutex<()>,
}

impl StorageBackend {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| CatalogError::Storage(e.to_string()))?;
        let prefixes = vec![CACHE_PREFIX.to_string(), BOOKMARK_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .map_err(|e| CatalogError::Storage(format!("failed to init cnidarium storage: {}", e)))?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
        })
    }

    async fn commit(&self, delta: StateDelta<cnidarium::Snapshot>) -> Result<()> {
        self.storage
            .commit(delta)
            .await
            .map(|_| ())
            .map_err(|e| CatalogError::Storage(e.to_string()))
    }
}

#[async_trait]
impl CacheBackend for StorageBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let snapshot = self.storage.latest_snapshot();
        snapshot
            .get_raw(key)
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))
    }

    async fn put_raw(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        let size = value.len();
        delta.put_raw(key.to_string(), value);
        self.commit(delta).await?;
        debug!(key, size, "cache entry written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        delta.delete(key.to_string());
        self.commit(delta).await?;
        debug!(key, "cache entry deleted");
        Ok(())
    }
}

/// In-process backend. Used in tests and when the disk store is unavailable.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_raw(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
