/// Follow relationships
///
/// Toggle semantics backed by the (follower, followed) uniqueness
/// constraint; a lost create race means the follow already exists,
/// which is the state the caller asked for.
use crate::error::{is_unique_violation, AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

/// Result of flipping a follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Followed,
    Unfollowed,
}

/// One edge of the follow graph, joined with the counterpart's name
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FollowEntry {
    pub user_id: i64,
    pub username: String,
    pub followed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FollowManager {
    db: SqlitePool,
}

impl FollowManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn toggle_follow(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> AppResult<FollowChange> {
        if follower_id == followed_id {
            return Err(AppError::Validation(
                "You cannot follow yourself".to_string(),
            ));
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM follows WHERE follower_id = ? AND followed_id = ?",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(&self.db)
        .await?;

        if let Some(id) = existing {
            sqlx::query("DELETE FROM follows WHERE id = ?")
                .bind(id)
                .execute(&self.db)
                .await?;
            return Ok(FollowChange::Unfollowed);
        }

        match sqlx::query(
            "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await
        {
            Ok(_) => Ok(FollowChange::Followed),
            Err(e) if is_unique_violation(&e) => Ok(FollowChange::Followed),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn is_following(&self, follower_id: i64, followed_id: i64) -> AppResult<bool> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM follows WHERE follower_id = ? AND followed_id = ?",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(existing.is_some())
    }

    /// Users following `user_id`, most recent first.
    pub async fn followers_of(&self, user_id: i64) -> AppResult<Vec<FollowEntry>> {
        let entries = sqlx::query_as::<_, FollowEntry>(
            r#"
            SELECT u.id AS user_id, u.username, f.created_at AS followed_at
            FROM follows f
            JOIN users u ON u.id = f.follower_id
            WHERE f.followed_id = ?
            ORDER BY f.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    /// Users `user_id` follows, most recent first.
    pub async fn following_of(&self, user_id: i64) -> AppResult<Vec<FollowEntry>> {
        let entries = sqlx::query_as::<_, FollowEntry>(
            r#"
            SELECT u.id AS user_id, u.username, f.created_at AS followed_at
            FROM follows f
            JOIN users u ON u.id = f.followed_id
            WHERE f.follower_id = ?
            ORDER BY f.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE follows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                follower_id INTEGER NOT NULL,
                followed_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (follower_id, followed_id),
                CHECK (follower_id <> followed_id)
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_follow_toggles() {
        let manager = FollowManager::new(setup_db().await);

        assert_eq!(
            manager.toggle_follow(1, 2).await.unwrap(),
            FollowChange::Followed
        );
        assert!(manager.is_following(1, 2).await.unwrap());

        assert_eq!(
            manager.toggle_follow(1, 2).await.unwrap(),
            FollowChange::Unfollowed
        );
        assert!(!manager.is_following(1, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_self_follow_rejected() {
        let manager = FollowManager::new(setup_db().await);

        let result = manager.toggle_follow(5, 5).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_follow_is_directional() {
        let manager = FollowManager::new(setup_db().await);

        manager.toggle_follow(1, 2).await.unwrap();
        assert!(manager.is_following(1, 2).await.unwrap());
        assert!(!manager.is_following(2, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_insert_reads_as_following() {
        let manager = FollowManager::new(setup_db().await);

        sqlx::query("INSERT INTO follows (follower_id, followed_id, created_at) VALUES (1, 2, ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&manager.db)
            .await
            .unwrap();

        let insert =
            sqlx::query("INSERT INTO follows (follower_id, followed_id, created_at) VALUES (1, 2, ?)")
                .bind(Utc::now().to_rfc3339())
                .execute(&manager.db)
                .await;
        assert!(matches!(insert, Err(ref e) if is_unique_violation(e)));

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = 1 AND followed_id = 2")
                .fetch_one(&manager.db)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_follower_and_following_lists() {
        let manager = FollowManager::new(setup_db().await);

        sqlx::query("INSERT INTO users (username) VALUES ('alice'), ('bob'), ('carol')")
            .execute(&manager.db)
            .await
            .unwrap();

        // alice and bob follow carol; carol follows alice.
        manager.toggle_follow(1, 3).await.unwrap();
        manager.toggle_follow(2, 3).await.unwrap();
        manager.toggle_follow(3, 1).await.unwrap();

        let followers = manager.followers_of(3).await.unwrap();
        assert_eq!(followers.len(), 2);
        assert_eq!(followers[0].username, "bob");
        assert_eq!(followers[1].username, "alice");

        let following = manager.following_of(3).await.unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].username, "alice");
    }
}
