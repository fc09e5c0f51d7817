/// Activity audit log
///
/// Append-only record of user actions. Handlers call `record` (or the
/// non-raising `try_record`) explicitly after their persistence step;
/// nothing is logged implicitly. Entries are never mutated after
/// creation except to backfill the entity reference once an
/// insert-assigned id becomes known.
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Kinds of actions that end up in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Create,
    Read,
    Update,
    Delete,
    Login,
    Logout,
    LoginFailed,
    Like,
    Unlike,
    Follow,
    Unfollow,
    Bookmark,
    Unbookmark,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "CREATE",
            ActionType::Read => "READ",
            ActionType::Update => "UPDATE",
            ActionType::Delete => "DELETE",
            ActionType::Login => "LOGIN",
            ActionType::Logout => "LOGOUT",
            ActionType::LoginFailed => "LOGIN_FAILED",
            ActionType::Like => "LIKE",
            ActionType::Unlike => "UNLIKE",
            ActionType::Follow => "FOLLOW",
            ActionType::Unfollow => "UNFOLLOW",
            ActionType::Bookmark => "BOOKMARK",
            ActionType::Unbookmark => "UNBOOKMARK",
        }
    }
}

/// Outcome recorded with each entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Success,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "SUCCESS",
            ActionStatus::Failed => "FAILED",
        }
    }
}

/// Tagged reference to the entity an action touched
#[derive(Debug, Clone, Copy)]
pub struct EntityRef {
    pub kind: &'static str,
    pub id: i64,
}

impl EntityRef {
    pub fn user(id: i64) -> Self {
        Self { kind: "user", id }
    }

    pub fn post(id: i64) -> Self {
        Self { kind: "post", id }
    }

    pub fn comment(id: i64) -> Self {
        Self { kind: "comment", id }
    }

    pub fn role(id: i64) -> Self {
        Self { kind: "role", id }
    }
}

/// Stored audit log entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub status: String,
    pub remarks: String,
    pub entity_kind: Option<String>,
    pub entity_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ActivityLogger {
    db: SqlitePool,
}

impl ActivityLogger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append an entry and return its id.
    ///
    /// `actor` is None for anonymous events such as failed logins.
    pub async fn record(
        &self,
        actor: Option<i64>,
        action: ActionType,
        status: ActionStatus,
        remarks: &str,
        entity: Option<EntityRef>,
    ) -> AppResult<i64> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO activity_log (user_id, action, status, remarks, entity_kind, entity_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(actor)
        .bind(action.as_str())
        .bind(status.as_str())
        .bind(remarks)
        .bind(entity.map(|e| e.kind))
        .bind(entity.map(|e| e.id))
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Append an entry, swallowing failures.
    ///
    /// Audit writes must never block the primary operation, so errors
    /// are logged and dropped here.
    pub async fn try_record(
        &self,
        actor: Option<i64>,
        action: ActionType,
        status: ActionStatus,
        remarks: &str,
        entity: Option<EntityRef>,
    ) -> Option<i64> {
        match self.record(actor, action, status, remarks, entity).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    action = action.as_str(),
                    error = %e,
                    "failed to write activity log entry"
                );
                None
            }
        }
    }

    /// Backfill the entity reference on an existing entry.
    ///
    /// Used when the entity id is only assigned on insert, after the
    /// log entry was already written.
    pub async fn attach_entity(&self, log_id: i64, entity: EntityRef) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE activity_log SET entity_kind = ?, entity_id = ? WHERE id = ?",
        )
        .bind(entity.kind)
        .bind(entity.id)
        .bind(log_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Activity log entry not found".to_string()));
        }

        Ok(())
    }

    /// Newest entries first
    pub async fn list_recent(&self, limit: i64) -> AppResult<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT id, user_id, action, status, remarks, entity_kind, entity_id, created_at
            FROM activity_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    /// Newest entries for one user
    pub async fn list_for_user(&self, user_id: i64, limit: i64) -> AppResult<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT id, user_id, action, status, remarks, entity_kind, entity_id, created_at
            FROM activity_log
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    /// Delete entries older than the cutoff, returning how many went.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM activity_log WHERE created_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
