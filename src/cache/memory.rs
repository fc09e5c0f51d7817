/// In-process cache backend
///
/// Default backend for development and tests. Entries carry a deadline;
/// expired entries are dropped lazily on access and in bulk by the
/// periodic sweep job.
use crate::cache::CacheStore;
use crate::error::AppResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    deadline: Instant,
}

impl Entry {
    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// DashMap-backed cache with TTL semantics
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired ones may still be counted until
    /// the next sweep)
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                deadline: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn sweep(&self) -> AppResult<usize> {
        let before = self.len();
        self.entries.retain(|_, entry| !entry.expired());
        Ok(before - self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", 0).await.unwrap();
        // Zero TTL expires immediately
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "first", 60).await.unwrap();
        cache.set_ex("k", "second", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_drops_only_expired() {
        let cache = MemoryCache::new();
        cache.set_ex("dead", "v", 0).await.unwrap();
        cache.set_ex("live", "v", 60).await.unwrap();

        let removed = cache.sweep().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("live").await.unwrap(), Some("v".to_string()));
    }
}
