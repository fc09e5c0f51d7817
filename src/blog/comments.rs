/// Comments with one level of replies
///
/// A reply's parent must itself be top-level, so threads never nest
/// deeper than one level. Deleting a parent cascades to its replies.
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Top-level comment with its replies, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Clone)]
pub struct CommentManager {
    db: SqlitePool,
}

impl CommentManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        body: &str,
        parent_id: Option<i64>,
    ) -> AppResult<Comment> {
        if let Some(parent) = parent_id {
            let parent_row = self
                .get_comment(parent)
                .await?
                .ok_or_else(|| AppError::NotFound("Parent comment not found".to_string()))?;

            if parent_row.post_id != post_id {
                return Err(AppError::Validation(
                    "Parent comment belongs to a different post".to_string(),
                ));
            }
            if parent_row.parent_id.is_some() {
                return Err(AppError::Validation(
                    "Replies cannot go more than one level deep".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO comments (post_id, author_id, parent_id, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(parent_id)
        .bind(body)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id,
            author_id,
            parent_id,
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_comment(&self, comment_id: i64) -> AppResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, parent_id, body, created_at, updated_at
            FROM comments
            WHERE id = ?
            "#,
        )
        .bind(comment_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(comment)
    }

    /// All threads for a post, oldest parents first.
    pub async fn list_for_post(&self, post_id: i64) -> AppResult<Vec<CommentThread>> {
        let rows = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, parent_id, body, created_at, updated_at
            FROM comments
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;

        let mut threads: Vec<CommentThread> = Vec::new();
        for row in rows {
            match row.parent_id {
                None => threads.push(CommentThread {
                    comment: row,
                    replies: Vec::new(),
                }),
                Some(parent) => {
                    // Parents sort before replies because ids ascend.
                    if let Some(thread) = threads.iter_mut().find(|t| t.comment.id == parent) {
                        thread.replies.push(row);
                    }
                }
            }
        }

        Ok(threads)
    }

    pub async fn update_comment(&self, comment_id: i64, body: &str) -> AppResult<Comment> {
        let result = sqlx::query("UPDATE comments SET body = ?, updated_at = ? WHERE id = ?")
            .bind(body)
            .bind(Utc::now().to_rfc3339())
            .bind(comment_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }

        self.get_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))
    }

    /// Delete a comment and, through the FK cascade, its replies.
    pub async fn delete_comment(&self, comment_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(comment_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }

        Ok(())
    }

    pub async fn count_for_post(&self, post_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }
}
