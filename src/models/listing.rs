use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::storage::{prefix_of, ObjectEntry, ObjectStore, StorageError};

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Vec<ObjectEntry>>,
    // Bumped by every invalidation, so a fetch that overlapped one is not cached
    generations: HashMap<String, u64>,
}

/// Cached directory listings, keyed by prefix.
///
/// Upload completion invalidates the prefix the object landed in; the next
/// [`list`](Self::list) of that prefix goes back to the store.
#[derive(Default)]
pub struct DirectoryCache {
    state: Mutex<CacheState>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, prefix: &str) -> Option<Vec<ObjectEntry>> {
        self.lock().entries.get(prefix).cloned()
    }

    pub fn is_cached(&self, prefix: &str) -> bool {
        self.lock().entries.contains_key(prefix)
    }

    pub fn invalidate(&self, prefix: &str) {
        let mut state = self.lock();
        *state.generations.entry(prefix.to_string()).or_default() += 1;
        if state.entries.remove(prefix).is_some() {
            log::debug!("Listing cache invalidated for '{prefix}'");
        }
    }

    /// Drop the listing that contains `key`.
    pub fn invalidate_for_key(&self, key: &str) {
        self.invalidate(prefix_of(key));
    }

    /// Cached listing of `prefix`, fetched from `store` on a miss.
    ///
    /// A fetched listing is only cached if `prefix` was not invalidated
    /// while the fetch ran.
    pub async fn list(
        &self,
        store: &dyn ObjectStore,
        prefix: &str,
    ) -> Result<Vec<ObjectEntry>, StorageError> {
        if let Some(entries) = self.get(prefix) {
            return Ok(entries);
        }
        let generation = self.lock().generations.get(prefix).copied().unwrap_or(0);
        let entries = store.list_objects(prefix).await?;

        let mut state = self.lock();
        if state.generations.get(prefix).copied().unwrap_or(0) == generation {
            state.entries.insert(prefix.to_string(), entries.clone());
        } else {
            log::debug!("Listing of '{prefix}' went stale while loading");
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoreOp};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn listing_is_cached_until_invalidated() {
        let store = MemoryStore::new();
        store.insert("uploads/a.txt", "a");
        let cache = DirectoryCache::new();

        assert_eq!(cache.list(&store, "uploads/").await.unwrap().len(), 1);
        store.insert("uploads/b.txt", "b");
        assert_eq!(cache.list(&store, "uploads/").await.unwrap().len(), 1);
        assert_eq!(store.calls(StoreOp::List).len(), 1);

        cache.invalidate_for_key("uploads/b.txt");
        assert!(!cache.is_cached("uploads/"));
        assert_eq!(cache.list(&store, "uploads/").await.unwrap().len(), 2);
        assert_eq!(store.calls(StoreOp::List).len(), 2);
    }

    #[tokio::test]
    async fn listing_invalidated_mid_fetch_is_not_cached() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(100)));
        store.insert("uploads/a.txt", "a");
        let cache = Arc::new(DirectoryCache::new());

        let fetch = {
            let (store, cache) = (Arc::clone(&store), Arc::clone(&cache));
            tokio::spawn(async move { cache.list(store.as_ref(), "uploads/").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.insert("uploads/b.txt", "b");
        cache.invalidate_for_key("uploads/b.txt");

        fetch.await.unwrap().unwrap();
        assert!(!cache.is_cached("uploads/"));
        assert_eq!(cache.list(store.as_ref(), "uploads/").await.unwrap().len(), 2);
        assert!(cache.is_cached("uploads/"));
    }
}
