use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::backend::{CacheBackend, BOOKMARK_PREFIX};
use crate::proposals::Track;

/// Bookmarked document numbers, one set per track and owner.
pub struct BookmarkStore {
    backend: Arc<dyn CacheBackend>,
    /// Serializes read-modify-write toggles.
    update_lock: Mutex<()>,
}

impl BookmarkStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            update_lock: Mutex::new(()),
        }
    }

    pub fn key(track: Track, owner: &str) -> String {
        format!("{}/{}/{}", BOOKMARK_PREFIX, track.key(), owner)
    }

    /// Unreadable or malformed entries read as an empty set.
    pub async fn list(&self, track: Track, owner: &str) -> BTreeSet<String> {
        let key = Self::key(track, owner);
        let bytes = match self.backend.get_raw(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return BTreeSet::new(),
            Err(e) => {
                warn!(key, "bookmark read failed: {}", e);
                return BTreeSet::new();
            }
        };
        serde_json::from_slice::<Vec<String>>(&bytes)
            .map(|numbers| numbers.into_iter().collect())
            .unwrap_or_else(|e| {
                warn!(key, "discarding malformed bookmarks: {}", e);
                BTreeSet::new()
            })
    }

    pub async fn contains(&self, track: Track, owner: &str, number: &str) -> bool {
        self.list(track, owner).await.contains(number)
    }

    /// Flip one bookmark. Returns whether `number` is now bookmarked.
    /// A failed write is logged and the in-memory answer still returned.
    pub async fn toggle(&self, track: Track, owner: &str, number: &str) -> bool {
        let _guard = self.update_lock.lock().await;
        let mut set = self.list(track, owner).await;
        let now_bookmarked = if set.remove(number) {
            false
        } else {
            set.insert(number.to_string());
            true
        };

        let key = Self::key(track, owner);
        let numbers: Vec<&String> = set.iter().collect();
        match serde_json::to_vec(&numbers) {
            Ok(bytes) => {
                if let Err(e) = self.backend.put_raw(&key, bytes).await {
                    warn!(key, "bookmark write failed: {}", e);
                }
            }
            Err(e) => warn!(key, "bookmark encode failed: {}", e),
        }
        now_bookmarked
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cache::backend::MemoryBackend;

    #[tokio::test]
    async fn toggles_per_track_and_owner() {
        let store = BookmarkStore::new(Arc::new(MemoryBackend::new()));

        assert!(store.toggle(Track::Enhancements, "alice", "2133").await);
        assert!(store.toggle(Track::Enhancements, "alice", "541").await);
        assert!(store.contains(Track::Enhancements, "alice", "2133").await);
        assert!(!store.contains(Track::Gateway, "alice", "2133").await);
        assert!(!store.contains(Track::Enhancements, "bob", "2133").await);

        assert!(!store.toggle(Track::Enhancements, "alice", "2133").await);
        let list: Vec<String> = store
            .list(Track::Enhancements, "alice")
            .await
            .into_iter()
            .collect();
        assert_eq!(list, vec!["541".to_string()]);
    }

    #[tokio::test]
    async fn malformed_entry_reads_as_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put_raw(&BookmarkStore::key(Track::Gateway, "u"), b"{not json".to_vec())
            .await
            .unwrap();
        let store = BookmarkStore::new(backend);

        assert!(store.list(Track::Gateway, "u").await.is_empty());
        assert!(store.toggle(Track::Gateway, "u", "1713").await);
        assert!(store.contains(Track::Gateway, "u", "1713").await);
    }
}
