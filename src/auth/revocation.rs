/// Token revocation blacklist
///
/// Revoked tokens are keyed by SHA-256 digest in the ephemeral cache so
/// raw tokens never sit in the store. Entries outlive the longest token
/// lifetime, after which the token is expired anyway.
use crate::cache::{categories, Cache};
use crate::error::AppResult;
use sha2::{Digest, Sha256};

/// Revocation store over the keyed cache
#[derive(Clone)]
pub struct RevocationStore {
    cache: Cache,
    ttl_secs: u64,
}

impl RevocationStore {
    pub fn new(cache: Cache, ttl_secs: u64) -> Self {
        Self { cache, ttl_secs }
    }

    fn token_key(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Mark a token revoked. Revoking an already-revoked token only
    /// refreshes the entry's TTL.
    pub async fn blacklist(&self, token: &str) -> AppResult<()> {
        let key = Self::token_key(token);
        self.cache
            .set(categories::REVOKED_TOKEN, &key, &true, self.ttl_secs)
            .await?;

        crate::metrics::record_token_revoked();
        tracing::debug!("Token blacklisted");
        Ok(())
    }

    /// True when the token has been revoked and the entry has not aged
    /// out. Callers must verify the token structurally first; this check
    /// only answers for tokens that already passed validation.
    pub async fn is_revoked(&self, token: &str) -> AppResult<bool> {
        let key = Self::token_key(token);
        self.cache.exists(categories::REVOKED_TOKEN, &key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::sync::Arc;

    fn store() -> RevocationStore {
        let cache = Cache::with_backend(Arc::new(MemoryCache::new()), "test");
        RevocationStore::new(cache, 604800)
    }

    #[tokio::test]
    async fn test_blacklisted_token_is_revoked() {
        let store = store();

        store.blacklist("token-a").await.unwrap();
        assert!(store.is_revoked("token-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_revoked() {
        let store = store();
        assert!(!store.is_revoked("never-seen").await.unwrap());
    }

    #[tokio::test]
    async fn test_revocation_is_per_token() {
        let store = store();

        store.blacklist("token-a").await.unwrap();
        assert!(!store.is_revoked("token-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_double_blacklist_is_idempotent() {
        let store = store();

        store.blacklist("token-a").await.unwrap();
        store.blacklist("token-a").await.unwrap();
        assert!(store.is_revoked("token-a").await.unwrap());
    }
}
