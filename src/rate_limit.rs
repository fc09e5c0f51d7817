/// Rate Limiting System
///
/// Three buckets: a global per-minute limiter for all traffic, a
/// tighter one for the credential endpoints, and a per-user keyed
/// limiter for OTP requests (3/minute, matching the verification
/// mail budget).
use crate::{
    config::RateLimitConfig,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

fn per_minute(count: u32, fallback: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(count).unwrap_or(NonZeroU32::new(fallback).unwrap()))
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    general: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    auth: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    otp: Arc<GovernorLimiter<i64, DefaultKeyedStateStore<i64>, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            general: Arc::new(GovernorLimiter::direct(per_minute(
                config.global_requests_per_minute,
                3000,
            ))),
            auth: Arc::new(GovernorLimiter::direct(per_minute(
                config.auth_requests_per_minute,
                30,
            ))),
            otp: Arc::new(GovernorLimiter::keyed(per_minute(
                config.otp_requests_per_minute,
                3,
            ))),
        }
    }

    pub fn check_general(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.general.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(AppError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            }),
        }
    }

    /// Login, registration, and token endpoints.
    pub fn check_auth(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.auth.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(AppError::RateLimitExceeded {
                retry_after: Duration::from_secs(2),
            }),
        }
    }

    /// OTP issue requests, keyed per user.
    pub fn check_otp(&self, user_id: i64) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.otp.check_key(&user_id) {
            Ok(_) => Ok(()),
            Err(_) => Err(AppError::RateLimitExceeded {
                retry_after: Duration::from_secs(20),
            }),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path();

    if path.starts_with("/api/auth") {
        ctx.rate_limiter.check_auth()?;
    } else {
        ctx.rate_limiter.check_general()?;
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(global: u32, auth: u32, otp: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            global_requests_per_minute: global,
            auth_requests_per_minute: auth,
            otp_requests_per_minute: otp,
        }
    }

    #[test]
    fn test_first_requests_pass() {
        let limiter = RateLimiter::new(&config(3000, 30, 3));

        assert!(limiter.check_general().is_ok());
        assert!(limiter.check_auth().is_ok());
        assert!(limiter.check_otp(1).is_ok());
    }

    #[test]
    fn test_auth_bucket_exhausts() {
        let limiter = RateLimiter::new(&config(3000, 5, 3));

        for _ in 0..5 {
            assert!(limiter.check_auth().is_ok());
        }
        assert!(matches!(
            limiter.check_auth(),
            Err(AppError::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_otp_limit_is_per_user() {
        let limiter = RateLimiter::new(&config(3000, 30, 3));

        for _ in 0..3 {
            assert!(limiter.check_otp(1).is_ok());
        }
        assert!(limiter.check_otp(1).is_err());

        // A different user still has a full bucket.
        assert!(limiter.check_otp(2).is_ok());
    }

    #[test]
    fn test_disabled_limiter_always_passes() {
        let mut cfg = config(1, 1, 1);
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg);

        for _ in 0..10 {
            assert!(limiter.check_auth().is_ok());
            assert!(limiter.check_otp(1).is_ok());
        }
    }
}
