/// Account manager implementation using runtime queries
use crate::{
    account::ProfileResponse,
    db::models::User,
    error::{AppError, AppResult},
    roles::RoleManager,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::SqlitePool;

/// Account manager service
#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
    roles: RoleManager,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool) -> Self {
        let roles = RoleManager::new(db.clone());
        Self { db, roles }
    }

    /// Register a new user. New users receive the default role and start
    /// unverified.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        bio: Option<String>,
    ) -> AppResult<User> {
        self.validate_username(username)?;
        self.validate_email(email)?;

        if self.username_exists(username).await? {
            return Err(AppError::Conflict(format!(
                "Username {} already taken",
                username
            )));
        }

        if self.email_exists(email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(password)?;
        let role_id = self.roles.default_role_id().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, username, password_hash, bio, verified, is_premium, is_active, role_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, 0, 1, ?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(&password_hash)
        .bind(&bio)
        .bind(role_id)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await;

        let result = match result {
            Ok(done) => done,
            // A concurrent registration may slip past the pre-checks;
            // the unique constraints are the source of truth.
            Err(e) if crate::error::is_unique_violation(&e) => {
                return Err(AppError::Conflict(
                    "Username or email already registered".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(User {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
            bio,
            verified: false,
            is_premium: false,
            is_active: true,
            role_id: Some(role_id),
            created_at: now,
            updated_at: now,
        })
    }

    /// Authenticate by username or email plus password. Missing users
    /// and bad passwords fail with the same generic error.
    pub async fn login(&self, identifier: &str, password: &str) -> AppResult<User> {
        let user = self
            .get_by_identifier(identifier)
            .await?
            .ok_or_else(AppError::invalid_credentials)?;

        if !user.is_active {
            return Err(AppError::Authorization("Account is deactivated".to_string()));
        }

        if !verify_password(password, &user.password_hash) {
            return Err(AppError::invalid_credentials());
        }

        Ok(user)
    }

    /// Get a user by id
    pub async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, bio, verified, is_premium, is_active, role_id, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// Get a user by username
    pub async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, bio, verified, is_premium, is_active, role_id, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// Get a user by username or email
    pub async fn get_by_identifier(&self, identifier: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, bio, verified, is_premium, is_active, role_id, created_at, updated_at
            FROM users
            WHERE username = ? OR email = ?
            "#,
        )
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// Permission mask for a user. NULL role or a deleted role yields an
    /// empty mask, denying everything.
    pub async fn permissions_for(&self, user: &User) -> AppResult<i64> {
        let Some(role_id) = user.role_id else {
            return Ok(0);
        };

        match self.roles.get_role(role_id).await? {
            Some(role) => Ok(role.permissions),
            None => Ok(0),
        }
    }

    /// Mark a user's email as verified
    pub async fn mark_verified(&self, user_id: i64) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET verified = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No user with id {}", user_id)));
        }

        Ok(())
    }

    /// Change password after verifying the current one
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No user with id {}", user_id)))?;

        if !verify_password(current_password, &user.password_hash) {
            return Err(AppError::invalid_credentials());
        }

        let password_hash = hash_password(new_password)?;

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Assign a role to a user (None clears)
    pub async fn set_role(&self, user_id: i64, role_id: Option<i64>) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET role_id = ?, updated_at = ? WHERE id = ?")
            .bind(role_id)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No user with id {}", user_id)));
        }

        Ok(())
    }

    /// Set the premium flag
    pub async fn set_premium(&self, user_id: i64, premium: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET is_premium = ?, updated_at = ? WHERE id = ?")
            .bind(premium)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No user with id {}", user_id)));
        }

        Ok(())
    }

    /// Activate or deactivate an account. Deactivated accounts cannot
    /// log in.
    pub async fn set_active(&self, user_id: i64, active: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No user with id {}", user_id)));
        }

        Ok(())
    }

    /// Delete a user. Owned rows (posts, comments, likes, bookmarks,
    /// follows, notifications, activity entries) cascade.
    pub async fn delete_user(&self, user_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No user with id {}", user_id)));
        }

        Ok(())
    }

    /// Build the profile serialization for a user. Email is included
    /// only when the viewer is the owner or an admin.
    pub async fn profile(&self, user: &User, include_email: bool) -> AppResult<ProfileResponse> {
        let followers_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE followed_id = ?")
                .bind(user.id)
                .fetch_one(&self.db)
                .await?;

        let following_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = ?")
                .bind(user.id)
                .fetch_one(&self.db)
                .await?;

        let posts_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE author_id = ? AND status = 'published'",
        )
        .bind(user.id)
        .fetch_one(&self.db)
        .await?;

        let role = match user.role_id {
            Some(role_id) => self.roles.get_role(role_id).await?.map(|r| r.name),
            None => None,
        };

        Ok(ProfileResponse {
            id: user.id,
            username: user.username.clone(),
            bio: user.bio.clone(),
            verified: user.verified,
            is_premium: user.is_premium,
            role,
            followers_count,
            following_count,
            posts_count,
            joined: user.created_at,
            email: include_email.then(|| user.email.clone()),
        })
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Validate username format
    fn validate_username(&self, username: &str) -> AppResult<()> {
        if username.is_empty() {
            return Err(AppError::Validation("Username cannot be empty".to_string()));
        }

        if username.len() < 3 {
            return Err(AppError::Validation(
                "Username must be at least 3 characters".to_string(),
            ));
        }

        if username.len() > 30 {
            return Err(AppError::Validation("Username too long".to_string()));
        }

        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::Validation(
                "Username contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate email format
    fn validate_email(&self, email: &str) -> AppResult<()> {
        if !email.contains('@') {
            return Err(AppError::Validation("Invalid email format".to_string()));
        }

        Ok(())
    }
}

/// Hash a password with Argon2id and a fresh salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
