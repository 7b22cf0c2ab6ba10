pub mod backend;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::proposals::Track;

use backend::{CacheBackend, CACHE_PREFIX};

/// Bumped whenever the cached record layout changes.
const SCHEMA_VERSION: &str = "v3";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Epoch millis at write time.
    pub timestamp: i64,
}

/// Best-effort timestamped key/value cache. Never fails: read problems are
/// misses, write problems are logged and dropped.
#[derive(Clone)]
pub struct PersistentCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
}

impl PersistentCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Value under `key` if it was written less than `ttl` ago.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let entry = self.read_entry::<T>(key).await?;
        let age = self.clock.now_millis() - entry.timestamp;
        if age < i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX) {
            Some(entry.data)
        } else {
            debug!(key, age_ms = age, "cache entry expired");
            None
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let entry = CacheEntry {
            data: value,
            timestamp: self.clock.now_millis(),
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, "failed to serialize cache entry: {}", e);
                return;
            }
        };
        if let Err(e) = self.backend.put_raw(key, bytes).await {
            warn!(key, "cache write dropped: {}", e);
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(key, "cache delete failed: {}", e);
        }
    }

    /// Write time of the entry under `key`, ignoring TTL.
    pub async fn timestamp(&self, key: &str) -> Option<i64> {
        self.read_entry::<serde::de::IgnoredAny>(key)
            .await
            .map(|entry| entry.timestamp)
    }

    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let raw = match self.backend.get_raw(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, "cache read failed: {}", e);
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, "ignoring malformed cache entry: {}", e);
                None
            }
        }
    }
}

/// Named cache slots, each with its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Tree,
    Collection,
    Recent,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Tree, Slot::Collection, Slot::Recent];

    pub fn ttl(self) -> Duration {
        match self {
            Slot::Tree => Duration::from_secs(60 * 60),
            Slot::Collection => Duration::from_secs(6 * 60 * 60),
            Slot::Recent => Duration::from_secs(60 * 60),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Slot::Tree => "tree",
            Slot::Collection => "collection",
            Slot::Recent => "recent",
        }
    }
}

/// What an invalidation clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Tree listing and assembled collection.
    Collection,
    Recent,
    All,
}

impl Scope {
    pub fn slots(self) -> &'static [Slot] {
        match self {
            Scope::Collection => &[Slot::Tree, Slot::Collection],
            Scope::Recent => &[Slot::Recent],
            Scope::All => &Slot::ALL,
        }
    }
}

/// Typed slots per track on top of `PersistentCache`.
#[derive(Clone)]
pub struct CacheManager {
    cache: PersistentCache,
}

impl CacheManager {
    pub fn new(cache: PersistentCache) -> Self {
        Self { cache }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.cache.clock()
    }

    pub fn key(track: Track, slot: Slot) -> String {
        format!(
            "{}/{}/{}_{}",
            CACHE_PREFIX,
            track.key(),
            slot.name(),
            SCHEMA_VERSION
        )
    }

    pub async fn load<T: DeserializeOwned>(&self, track: Track, slot: Slot) -> Option<T> {
        let value = self.cache.get(&Self::key(track, slot), slot.ttl()).await;
        if value.is_some() {
            debug!(track = %track, slot = slot.name(), "cache hit");
        }
        value
    }

    pub async fn store<T: Serialize>(&self, track: Track, slot: Slot, value: &T) {
        self.cache.set(&Self::key(track, slot), value).await;
    }

    pub async fn invalidate(&self, track: Track, scope: Scope) {
        for slot in scope.slots() {
            self.cache.remove(&Self::key(track, *slot)).await;
        }
        debug!(track = %track, ?scope, "cache invalidated");
    }

    /// Age of the slot's entry, expired or not.
    pub async fn age(&self, track: Track, slot: Slot) -> Option<chrono::Duration> {
        let written = self.cache.timestamp(&Self::key(track, slot)).await?;
        Some(chrono::Duration::milliseconds(
            self.cache.clock().now_millis() - written,
        ))
    }

    /// Age of the oldest assembled collection across `tracks`.
    pub async fn oldest_collection_age(&self, tracks: &[Track]) -> Option<chrono::Duration> {
        let mut oldest = None;
        for track in tracks {
            if let Some(age) = self.age(*track, Slot::Collection).await {
                oldest = Some(oldest.map_or(age, |o: chrono::Duration| o.max(age)));
            }
        }
        oldest
    }
}
