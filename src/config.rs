/// Configuration management for the Soliloquy backend
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub data_directory: PathBuf,
    pub db_path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default 24h)
    pub access_token_ttl: u64,
    /// Refresh token lifetime in seconds (default 7d). Revoked tokens
    /// stay blacklisted for this long, the longest a token can live.
    pub refresh_token_ttl: u64,
}

/// Cache backend configuration. A Redis URL selects the Redis backend;
/// without one the in-process memory backend is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
    pub key_prefix: String,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub global_requests_per_minute: u32,
    pub auth_requests_per_minute: u32,
    /// OTP issue requests per minute per instance
    pub otp_requests_per_minute: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("BLOG_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("BLOG_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env::var("BLOG_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("BLOG_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let db_path = env::var("BLOG_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("soliloquy.sqlite"));

        let jwt_secret = env::var("BLOG_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;
        let access_token_ttl = env::var("BLOG_ACCESS_TOKEN_TTL")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86400);
        let refresh_token_ttl = env::var("BLOG_REFRESH_TOKEN_TTL")
            .unwrap_or_else(|_| "604800".to_string())
            .parse()
            .unwrap_or(604800);

        let redis_url = env::var("BLOG_REDIS_URL").ok();
        let key_prefix = env::var("BLOG_CACHE_PREFIX").unwrap_or_else(|_| "soliloquy".to_string());

        let email = if let Ok(smtp_url) = env::var("BLOG_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("BLOG_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let rate_limit_enabled = env::var("BLOG_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let global_requests_per_minute = env::var("BLOG_RATE_LIMIT_GLOBAL_PER_MINUTE")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);
        let auth_requests_per_minute = env::var("BLOG_RATE_LIMIT_AUTH_PER_MINUTE")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);
        let otp_requests_per_minute = env::var("BLOG_RATE_LIMIT_OTP_PER_MINUTE")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(AppConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            database: DatabaseConfig {
                data_directory,
                db_path,
            },
            auth: AuthConfig {
                jwt_secret,
                access_token_ttl,
                refresh_token_ttl,
            },
            cache: CacheConfig {
                redis_url,
                key_prefix,
            },
            email,
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                global_requests_per_minute,
                auth_requests_per_minute,
                otp_requests_per_minute,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        // Blacklist entries live for the refresh TTL; a shorter refresh
        // TTL than access TTL would let revoked access tokens outlive
        // their blacklist entry.
        if self.auth.refresh_token_ttl < self.auth.access_token_ttl {
            return Err(AppError::Validation(
                "Refresh token TTL must not be shorter than access token TTL".to_string(),
            ));
        }

        Ok(())
    }
}
