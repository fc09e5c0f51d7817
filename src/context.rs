/// Application context and dependency injection
use crate::{
    account::AccountManager,
    activity::ActivityLogger,
    auth::{OtpStore, RevocationStore, TokenService},
    blog::{CommentManager, PostManager, ReactionManager},
    cache::Cache,
    config::AppConfig,
    db,
    error::{AppError, AppResult},
    follows::FollowManager,
    mailer::Mailer,
    notify::{NotificationHub, NotificationManager},
    rate_limit::RateLimiter,
    roles::RoleManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub cache: Cache,
    pub account_manager: Arc<AccountManager>,
    pub role_manager: Arc<RoleManager>,
    pub token_service: Arc<TokenService>,
    pub revocation_store: Arc<RevocationStore>,
    pub otp_store: Arc<OtpStore>,
    pub post_manager: Arc<PostManager>,
    pub comment_manager: Arc<CommentManager>,
    pub reaction_manager: Arc<ReactionManager>,
    pub follow_manager: Arc<FollowManager>,
    pub notification_manager: Arc<NotificationManager>,
    pub activity_logger: Arc<ActivityLogger>,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        // Initialize database
        let db = db::create_pool(&config.database.db_path, db::DatabaseOptions::default()).await?;

        // Run migrations
        db::run_migrations(&db).await?;

        // Test connection
        db::test_connection(&db).await?;

        // Initialize cache backend (Redis or in-process)
        let cache = Cache::from_config(&config.cache).await?;

        // Initialize account and role managers
        let account_manager = Arc::new(AccountManager::new(db.clone()));
        let role_manager = Arc::new(RoleManager::new(db.clone()));

        // Canonical roles must exist before the first registration.
        // Resolving the default role id eagerly makes a broken roles
        // table fail startup instead of the first signup.
        role_manager.seed_default_roles().await?;
        let default_role_id = role_manager.default_role_id().await?;
        tracing::debug!("Default role resolved to id {}", default_role_id);

        // Initialize token issuing and the revocation blacklist.
        // Blacklist entries live for the refresh TTL, the longest any
        // revoked token could otherwise stay valid.
        let token_service = Arc::new(TokenService::new(
            config.auth.jwt_secret.clone(),
            config.auth.access_token_ttl,
            config.auth.refresh_token_ttl,
        ));
        let revocation_store = Arc::new(RevocationStore::new(
            cache.clone(),
            config.auth.refresh_token_ttl,
        ));

        // Initialize the OTP verification store
        let otp_store = Arc::new(OtpStore::new(cache.clone()));

        // Initialize blog managers
        let post_manager = Arc::new(PostManager::new(db.clone()));
        let comment_manager = Arc::new(CommentManager::new(db.clone()));
        let reaction_manager = Arc::new(ReactionManager::new(db.clone()));
        let follow_manager = Arc::new(FollowManager::new(db.clone()));

        // Initialize notification fan-out (shared hub for live sessions)
        let hub = Arc::new(NotificationHub::new());
        let notification_manager = Arc::new(NotificationManager::new(db.clone(), hub));

        // Initialize activity logger
        let activity_logger = Arc::new(ActivityLogger::new(db.clone()));

        // Initialize rate limiter
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        // Initialize mailer
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config: Arc::new(config),
            db,
            cache,
            account_manager,
            role_manager,
            token_service,
            revocation_store,
            otp_store,
            post_manager,
            comment_manager,
            reaction_manager,
            follow_manager,
            notification_manager,
            activity_logger,
            rate_limiter,
            mailer,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &AppConfig) -> AppResult<()> {
        let dir = &config.database.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
