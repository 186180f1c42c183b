//! A cache adapter that uses local in-memory storage.

use crate::{CacheAdapter, CacheError};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::{Duration, Instant};

/// An entry in the in-memory store, that includes an expiration time.
#[derive(Debug)]
struct CacheEntry {
    /// The stored payload.
    bytes: Vec<u8>,

    /// After this time, the cache entry should no longer be considered valid,
    /// and should be removed. `None` entries never expire.
    expiration: Option<Instant>,
}

/// An in-process cache. Entries are dropped lazily when read after they
/// expire.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    /// The items stored in the cache.
    items: DashMap<String, CacheEntry>,
}

impl MemoryAdapter {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored entries, including expired entries not yet read.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl CacheAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        match self.items.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let expired = occupied.get().expiration.map_or(false, |exp| now >= exp);
                if expired {
                    tracing::debug!(%key, "cache expired");
                    occupied.remove();
                    Ok(None)
                } else {
                    Ok(Some(occupied.get().bytes.clone()))
                }
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        let expiration = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        tracing::debug!(%key, ?expiration, "inserting into cache");
        self.items.insert(
            key.to_string(),
            CacheEntry {
                bytes: value.to_vec(),
                expiration,
            },
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.items.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryAdapter;
    use crate::CacheAdapter;
    use std::time::Duration;

    #[tokio::test]
    async fn stores_and_returns_values() {
        let adapter = MemoryAdapter::new();
        assert_eq!(adapter.get("k").await.unwrap(), None);
        adapter.set("k", b"v1data", None).await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap(), Some(b"v1data".to_vec()));
    }

    #[tokio::test]
    async fn later_sets_overwrite() {
        let adapter = MemoryAdapter::new();
        adapter.set("k", b"one", None).await.unwrap();
        adapter.set("k", b"two", None).await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(adapter.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_removed_on_read() {
        let adapter = MemoryAdapter::new();
        adapter.set("k", b"v", Some(Duration::ZERO)).await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap(), None);
        assert!(adapter.is_empty());
    }

    #[tokio::test]
    async fn close_drops_everything() {
        let adapter = MemoryAdapter::new();
        adapter.set("a", b"1", None).await.unwrap();
        adapter.set("b", b"2", Some(Duration::from_secs(60))).await.unwrap();
        adapter.close().await.unwrap();
        assert!(adapter.is_empty());
    }
}
