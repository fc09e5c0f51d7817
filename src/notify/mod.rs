/// Notification persistence and fan-out
///
/// `publish` commits the row first, then pushes to live sessions.
/// There is no transaction spanning both: a failed push leaves the
/// durable row behind for the next list call.

pub mod hub;

pub use hub::NotificationHub;

use crate::{db::models::Notification, error::AppResult};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct NotificationManager {
    db: SqlitePool,
    hub: Arc<NotificationHub>,
}

impl NotificationManager {
    pub fn new(db: SqlitePool, hub: Arc<NotificationHub>) -> Self {
        Self { db, hub }
    }

    /// Live session registry, for WebSocket join/leave.
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Persist a notification, then push it to the target's live group.
    pub async fn publish(&self, user_id: i64, message: &str) -> AppResult<Notification> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO notifications (user_id, message, is_read, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(user_id)
        .bind(message)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        let notification = Notification {
            id: result.last_insert_rowid(),
            user_id,
            message: message.to_string(),
            is_read: false,
            created_at: now,
        };

        let delivered = self.hub.send(user_id, &notification);
        crate::metrics::record_notification_published(delivered);
        tracing::debug!(user_id, delivered, "notification published");

        Ok(notification)
    }

    /// List the caller's notifications newest first and mark them read.
    ///
    /// The returned rows carry the read flag as it stood before this
    /// call, so clients can style unread items.
    pub async fn list_and_mark_read(
        &self,
        user_id: i64,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, message, is_read, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Delete read notifications older than the cutoff (maintenance).
    pub async fn prune_read_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE is_read = 1 AND created_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup() -> NotificationManager {
        let pool = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        NotificationManager::new(pool, Arc::new(NotificationHub::new()))
    }

    #[tokio::test]
    async fn test_publish_persists_and_pushes() {
        let manager = setup().await;
        let (_session, mut rx) = manager.hub().join(7);

        let stored = manager.publish(7, "alice started following you").await.unwrap();
        assert!(stored.id > 0);
        assert!(!stored.is_read);

        let pushed = rx.recv().await.unwrap();
        assert_eq!(pushed.id, stored.id);
        assert_eq!(pushed.message, "alice started following you");
    }

    #[tokio::test]
    async fn test_publish_without_live_sessions_still_persists() {
        let manager = setup().await;

        manager.publish(7, "offline event").await.unwrap();

        let listed = manager.list_and_mark_read(7, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message, "offline event");
    }

    #[tokio::test]
    async fn test_list_marks_read() {
        let manager = setup().await;
        manager.publish(7, "one").await.unwrap();
        manager.publish(7, "two").await.unwrap();

        let first = manager.list_and_mark_read(7, 10).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].message, "two");
        assert!(first.iter().all(|n| !n.is_read));

        let second = manager.list_and_mark_read(7, 10).await.unwrap();
        assert!(second.iter().all(|n| n.is_read));
        assert_eq!(manager.unread_count(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_scoped_to_owner() {
        let manager = setup().await;
        manager.publish(1, "mine").await.unwrap();
        manager.publish(2, "theirs").await.unwrap();

        let listed = manager.list_and_mark_read(1, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message, "mine");
        assert_eq!(manager.unread_count(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune_only_removes_read_entries() {
        let manager = setup().await;

        let old = (Utc::now() - Duration::days(60)).to_rfc3339();
        sqlx::query(
            "INSERT INTO notifications (user_id, message, is_read, created_at) VALUES (1, 'old read', 1, ?)",
        )
        .bind(&old)
        .execute(&manager.db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO notifications (user_id, message, is_read, created_at) VALUES (1, 'old unread', 0, ?)",
        )
        .bind(&old)
        .execute(&manager.db)
        .await
        .unwrap();

        let removed = manager
            .prune_read_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = manager.list_and_mark_read(1, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "old unread");
    }
}
