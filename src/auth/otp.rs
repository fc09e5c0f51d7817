/// One-time verification codes
///
/// Six-digit codes bound to a user id, held in the ephemeral cache for
/// five minutes. At most one code is live per user; reissuing replaces
/// it. A successful validation consumes the code.
use crate::cache::{categories, Cache};
use crate::db::models::User;
use crate::error::AppResult;
use rand::Rng;

/// How long an issued code stays valid
pub const OTP_TTL_SECS: u64 = 300;

/// OTP store over the keyed cache
#[derive(Clone)]
pub struct OtpStore {
    cache: Cache,
}

impl OtpStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Issue a code for a user. Returns None for already-verified users;
    /// any previously issued code is overwritten.
    pub async fn issue(&self, user: &User) -> AppResult<Option<String>> {
        if user.verified {
            return Ok(None);
        }

        let code = generate_code();
        self.cache
            .set(categories::OTP, &user.id.to_string(), &code, OTP_TTL_SECS)
            .await?;

        tracing::debug!(user_id = user.id, "Issued verification code");
        Ok(Some(code))
    }

    /// Whether an unexpired code exists for this user. Callers use this
    /// to refuse a resend while a code is still live.
    pub async fn has_pending(&self, user_id: i64) -> AppResult<bool> {
        self.cache.exists(categories::OTP, &user_id.to_string()).await
    }

    /// Compare a submitted code against the stored one. A match consumes
    /// the entry; a mismatch, a missing entry, and an expired entry all
    /// return false without side effects.
    pub async fn validate(&self, user_id: i64, submitted: &str) -> AppResult<bool> {
        let stored: Option<String> = self.cache.get(categories::OTP, &user_id.to_string()).await?;

        let valid = match stored {
            Some(code) if code == submitted => {
                self.cache.delete(categories::OTP, &user_id.to_string()).await?;
                true
            }
            _ => false,
        };

        crate::metrics::record_otp_validation(valid);
        Ok(valid)
    }
}

/// Uniform six-digit code
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use chrono::Utc;
    use std::sync::Arc;

    fn cache() -> Cache {
        Cache::with_backend(Arc::new(MemoryCache::new()), "test")
    }

    fn user(id: i64, verified: bool) -> User {
        User {
            id,
            email: format!("u{}@example.com", id),
            username: format!("user{}", id),
            password_hash: "x".to_string(),
            bio: None,
            verified,
            is_premium: false,
            is_active: true,
            role_id: Some(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_issue_and_validate_consumes_code() {
        let store = OtpStore::new(cache());
        let user = user(1, false);

        let code = store.issue(&user).await.unwrap().unwrap();
        assert!(store.has_pending(1).await.unwrap());

        assert!(store.validate(1, &code).await.unwrap());
        // Single use: the same code no longer validates
        assert!(!store.validate(1, &code).await.unwrap());
        assert!(!store.has_pending(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_code_leaves_entry_intact() {
        let store = OtpStore::new(cache());
        let user = user(1, false);

        let code = store.issue(&user).await.unwrap().unwrap();
        assert!(!store.validate(1, "000000").await.unwrap());

        // Still pending, still valid
        assert!(store.has_pending(1).await.unwrap());
        assert!(store.validate(1, &code).await.unwrap());
    }

    #[tokio::test]
    async fn test_verified_user_gets_no_code() {
        let store = OtpStore::new(cache());
        let user = user(1, true);

        assert!(store.issue(&user).await.unwrap().is_none());
        assert!(!store.has_pending(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_reissue_overwrites_previous_code() {
        let store = OtpStore::new(cache());
        let user = user(1, false);

        let first = store.issue(&user).await.unwrap().unwrap();
        let second = store.issue(&user).await.unwrap().unwrap();

        if first != second {
            assert!(!store.validate(1, &first).await.unwrap());
        }
        assert!(store.validate(1, &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let shared = cache();
        let store = OtpStore::new(shared.clone());

        // Plant a code that is already past its deadline
        shared
            .set(categories::OTP, "1", &"123456".to_string(), 0)
            .await
            .unwrap();

        assert!(!store.validate(1, "123456").await.unwrap());
        assert!(!store.has_pending(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_codes_are_per_user() {
        let shared = cache();
        let store = OtpStore::new(shared.clone());

        shared
            .set(categories::OTP, "1", &"111111".to_string(), 60)
            .await
            .unwrap();
        shared
            .set(categories::OTP, "2", &"222222".to_string(), 60)
            .await
            .unwrap();

        assert!(!store.validate(2, "111111").await.unwrap());
        assert!(store.validate(1, "111111").await.unwrap());
        assert!(store.validate(2, "222222").await.unwrap());
    }
}
