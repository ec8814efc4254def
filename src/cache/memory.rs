//! In-process cache store with lazy per-entry expiry.
//!
//! Entries are dropped when read after their TTL and by
//! [`MemoryCache::purge_expired`], which the server runs periodically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Shared in-memory [`CacheStore`].
///
/// Thread-safe via an internal async RwLock.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it unless a writer replaced it in between.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::new();

        cache.set("k", "v".to_string(), MINUTE).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_dropped() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_many_ignores_missing() {
        let cache = MemoryCache::new();
        cache.set("a", "1".to_string(), MINUTE).await.unwrap();
        cache.set("b", "2".to_string(), MINUTE).await.unwrap();

        cache
            .delete(&["a".to_string(), "nope".to_string()])
            .await
            .unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_list_keys_by_prefix() {
        let cache = MemoryCache::new();
        cache.set("docs:list:a:1", "x".to_string(), MINUTE).await.unwrap();
        cache.set("docs:list:a:2", "x".to_string(), MINUTE).await.unwrap();
        cache.set("docs:list:b:1", "x".to_string(), MINUTE).await.unwrap();
        cache.set("docs:list:a:old", "x".to_string(), Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut keys = cache.list_keys("docs:list:a:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["docs:list:a:1", "docs:list:a:2"]);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("a", "1".to_string(), Duration::ZERO).await.unwrap();
        cache.set("b", "2".to_string(), Duration::ZERO).await.unwrap();
        cache.set("c", "3".to_string(), MINUTE).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.len().await, 3);

        let removed = cache.purge_expired().await;

        assert_eq!(removed, 2);
        assert_eq!(cache.len().await, 1);
    }
}
