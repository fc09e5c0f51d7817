/// Ephemeral keyed cache for Soliloquy
///
/// Holds the short-lived security state: OTP verification codes and
/// revoked token markers. Backed by Redis in production or an
/// in-process map for development and tests.

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use crate::config::CacheConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache backend trait
///
/// Implementations store string values under string keys with a TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store a value under a key, expiring after ttl_secs
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()>;

    /// Retrieve a value by key; None when absent or expired
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Delete a key
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check whether a key exists and has not expired
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Check backend liveness
    async fn ping(&self) -> AppResult<()>;

    /// Eagerly drop expired entries, returning the number removed.
    /// Backends whose server expires keys on its own keep the default.
    async fn sweep(&self) -> AppResult<usize> {
        Ok(0)
    }
}

/// Cache facade over the configured backend
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheStore>,
    key_prefix: String,
}

impl Cache {
    /// Create a cache from configuration. A Redis URL selects the Redis
    /// backend; without one the in-process memory backend is used.
    pub async fn from_config(config: &CacheConfig) -> AppResult<Self> {
        let backend: Arc<dyn CacheStore> = match &config.redis_url {
            Some(url) => {
                info!("Connecting to Redis at {}", url);
                Arc::new(RedisCache::connect(url).await?)
            }
            None => {
                info!("No Redis URL configured, using in-process cache");
                Arc::new(MemoryCache::new())
            }
        };

        Ok(Self {
            backend,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Build a cache around an explicit backend
    pub fn with_backend(backend: Arc<dyn CacheStore>, key_prefix: &str) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.to_string(),
        }
    }

    /// Build a cache key with prefix
    fn build_key(&self, category: &str, key: &str) -> String {
        format!("{}:{}{}", self.key_prefix, category, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, category: &str, key: &str) -> AppResult<Option<T>> {
        let cache_key = self.build_key(category, key);

        debug!("Cache GET: {}", cache_key);

        match self.backend.get(&cache_key).await? {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Failed to deserialize cached value: {}", e);
                    // Drop the corrupted entry
                    let _ = self.backend.delete(&cache_key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Set a value in cache with TTL
    pub async fn set<T: Serialize>(
        &self,
        category: &str,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> AppResult<()> {
        let cache_key = self.build_key(category, key);

        debug!("Cache SET: {} (TTL: {}s)", cache_key, ttl_secs);

        let json = serde_json::to_string(value)
            .map_err(|e| AppError::Cache(format!("Cache serialization failed: {}", e)))?;

        self.backend.set_ex(&cache_key, &json, ttl_secs).await
    }

    /// Delete a value from cache
    pub async fn delete(&self, category: &str, key: &str) -> AppResult<()> {
        let cache_key = self.build_key(category, key);

        debug!("Cache DELETE: {}", cache_key);

        self.backend.delete(&cache_key).await
    }

    /// Check if a key exists in cache
    pub async fn exists(&self, category: &str, key: &str) -> AppResult<bool> {
        let cache_key = self.build_key(category, key);
        self.backend.exists(&cache_key).await
    }

    /// Ping the backend to check connection
    pub async fn ping(&self) -> AppResult<()> {
        self.backend.ping().await
    }

    /// Drop expired entries from the backend. Redis expires keys
    /// server-side, so only the in-process backend does real work here.
    pub async fn sweep(&self) -> AppResult<usize> {
        self.backend.sweep().await
    }
}

/// Cache category constants
pub mod categories {
    pub const OTP: &str = "otp:";
    pub const REVOKED_TOKEN: &str = "revoked:";
}
