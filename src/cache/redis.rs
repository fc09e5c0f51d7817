/// Redis cache backend
use crate::cache::CacheStore;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{error, warn};

/// Redis-backed cache using a managed connection that reconnects on
/// failure.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis at the given URL
    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            AppError::Cache(format!("Redis connection failed: {}", e))
        })?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.set_ex(key, value, ttl_secs).await.map_err(|e| {
            warn!("Redis SET failed for {}: {}", key, e);
            AppError::Cache(format!("Cache set failed: {}", e))
        })
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(|e| {
            warn!("Redis GET failed for {}: {}", key, e);
            AppError::Cache(format!("Cache get failed: {}", e))
        })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.del(key).await.map_err(|e| {
            warn!("Redis DELETE failed for {}: {}", key, e);
            AppError::Cache(format!("Cache delete failed: {}", e))
        })
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.connection.clone();
        conn.exists(key).await.map_err(|e| {
            warn!("Redis EXISTS failed for {}: {}", key, e);
            AppError::Cache(format!("Cache exists check failed: {}", e))
        })
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis PING failed: {}", e);
                AppError::Cache(format!("Cache ping failed: {}", e))
            })?;

        if pong != "PONG" {
            return Err(AppError::Cache("Unexpected Redis PING response".to_string()));
        }

        Ok(())
    }
}
