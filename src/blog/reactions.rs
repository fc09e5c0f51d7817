/// Like and bookmark toggles
///
/// The (user, post) uniqueness constraint is the source of truth. Two
/// racing creates leave exactly one row; the loser's constraint
/// violation reads as "already in that state" rather than an error.
use crate::error::{is_unique_violation, AppResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

/// Result of flipping a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

impl ToggleOutcome {
    pub fn is_on(&self) -> bool {
        matches!(self, ToggleOutcome::Added)
    }
}

/// One user's like on a post, for the likes listing
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LikeEntry {
    pub user_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReactionManager {
    db: SqlitePool,
}

impl ReactionManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn toggle_like(&self, user_id: i64, post_id: i64) -> AppResult<ToggleOutcome> {
        self.toggle("likes", user_id, post_id).await
    }

    pub async fn toggle_bookmark(&self, user_id: i64, post_id: i64) -> AppResult<ToggleOutcome> {
        self.toggle("bookmarks", user_id, post_id).await
    }

    async fn toggle(&self, table: &str, user_id: i64, post_id: i64) -> AppResult<ToggleOutcome> {
        let select = format!("SELECT id FROM {} WHERE user_id = ? AND post_id = ?", table);
        let existing: Option<i64> = sqlx::query_scalar(&select)
            .bind(user_id)
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?;

        if let Some(id) = existing {
            let delete = format!("DELETE FROM {} WHERE id = ?", table);
            sqlx::query(&delete).bind(id).execute(&self.db).await?;
            return Ok(ToggleOutcome::Removed);
        }

        let insert = format!(
            "INSERT INTO {} (user_id, post_id, created_at) VALUES (?, ?, ?)",
            table
        );
        match sqlx::query(&insert)
            .bind(user_id)
            .bind(post_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.db)
            .await
        {
            Ok(_) => Ok(ToggleOutcome::Added),
            // Lost a create race; the row exists, which is the state
            // this call was trying to reach.
            Err(e) if is_unique_violation(&e) => Ok(ToggleOutcome::Added),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn likes_for_post(&self, post_id: i64) -> AppResult<Vec<LikeEntry>> {
        let likes = sqlx::query_as::<_, LikeEntry>(
            r#"
            SELECT l.user_id, u.username, l.created_at
            FROM likes l
            JOIN users u ON u.id = l.user_id
            WHERE l.post_id = ?
            ORDER BY l.id DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;

        Ok(likes)
    }

    pub async fn like_count(&self, post_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    pub async fn is_liked(&self, user_id: i64, post_id: i64) -> AppResult<bool> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM likes WHERE user_id = ? AND post_id = ?")
                .bind(user_id)
                .bind(post_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(existing.is_some())
    }

    pub async fn is_bookmarked(&self, user_id: i64, post_id: i64) -> AppResult<bool> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM bookmarks WHERE user_id = ? AND post_id = ?")
                .bind(user_id)
                .bind(post_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(existing.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();

        for table in ["likes", "bookmarks"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    post_id INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, post_id)
                )
                "#,
                table
            ))
            .execute(&pool)
            .await
            .unwrap();
        }

        sqlx::query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_like_toggles_on_and_off() {
        let manager = ReactionManager::new(setup_db().await);

        assert_eq!(
            manager.toggle_like(1, 1).await.unwrap(),
            ToggleOutcome::Added
        );
        assert!(manager.is_liked(1, 1).await.unwrap());

        assert_eq!(
            manager.toggle_like(1, 1).await.unwrap(),
            ToggleOutcome::Removed
        );
        assert!(!manager.is_liked(1, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_insert_reads_as_already_liked() {
        let manager = ReactionManager::new(setup_db().await);

        // Plant the row to simulate losing a create race after the
        // existence check.
        sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (1, 1, ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&manager.db)
            .await
            .unwrap();

        let insert = sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (1, 1, ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&manager.db)
            .await;
        assert!(matches!(insert, Err(ref e) if is_unique_violation(e)));

        assert_eq!(manager.like_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bookmarks_independent_of_likes() {
        let manager = ReactionManager::new(setup_db().await);

        manager.toggle_bookmark(1, 1).await.unwrap();
        assert!(manager.is_bookmarked(1, 1).await.unwrap());
        assert!(!manager.is_liked(1, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_likes_for_post_lists_users() {
        let manager = ReactionManager::new(setup_db().await);

        sqlx::query("INSERT INTO users (username) VALUES ('alice'), ('bob')")
            .execute(&manager.db)
            .await
            .unwrap();

        manager.toggle_like(1, 5).await.unwrap();
        manager.toggle_like(2, 5).await.unwrap();
        manager.toggle_like(2, 6).await.unwrap();

        let likes = manager.likes_for_post(5).await.unwrap();
        assert_eq!(likes.len(), 2);
        assert_eq!(likes[0].username, "bob");
        assert_eq!(likes[1].username, "alice");
        assert_eq!(manager.like_count(5).await.unwrap(), 2);
    }
}
