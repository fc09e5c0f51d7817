/// Post storage and lifecycle
///
/// Slugs are the public identifier: slugified title plus a random
/// 10-character suffix, regenerated if the insert hits the uniqueness
/// constraint. Deleting a post archives it rather than removing the
/// row; archived and draft posts stay visible to their author and to
/// admins only.
use crate::error::{is_unique_violation, AppError, AppResult};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

const SLUG_SUFFIX_LEN: usize = 10;
const SLUG_ATTEMPTS: u32 = 3;
const OVERVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

/// Listing order, newest by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOrder {
    #[default]
    Newest,
    MostViewed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub status: String,
    pub premium: bool,
    pub visit_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published.as_str()
    }

    /// First 50 characters of the body, for list responses.
    pub fn overview(&self) -> String {
        self.body.chars().take(OVERVIEW_CHARS).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Partial update; None leaves the field untouched.
#[derive(Debug, Default, Clone)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub premium: Option<bool>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<String>>,
}

/// Reduce a title to URL-safe lowercase with hyphen separators.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_hyphen = true;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SLUG_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

fn candidate_slug(title: &str) -> String {
    let base = slugify(title);
    if base.is_empty() {
        random_suffix()
    } else {
        format!("{}-{}", base, random_suffix())
    }
}

#[derive(Clone)]
pub struct PostManager {
    db: SqlitePool,
}

impl PostManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a post, retrying the slug on a uniqueness collision.
    pub async fn create_post(
        &self,
        author_id: i64,
        title: &str,
        body: &str,
        premium: bool,
        publish: bool,
        tags: &[String],
    ) -> AppResult<Post> {
        let now = Utc::now();
        let status = if publish {
            PostStatus::Published
        } else {
            PostStatus::Draft
        };
        let published_at = publish.then_some(now);

        let mut attempts = 0;
        let post_id = loop {
            let slug = candidate_slug(title);

            let result = sqlx::query(
                r#"
                INSERT INTO posts (author_id, title, slug, body, status, premium, visit_count, published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
                "#,
            )
            .bind(author_id)
            .bind(title)
            .bind(&slug)
            .bind(body)
            .bind(status.as_str())
            .bind(premium)
            .bind(published_at.map(|t| t.to_rfc3339()))
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&self.db)
            .await;

            match result {
                Ok(done) => break done.last_insert_rowid(),
                Err(e) if is_unique_violation(&e) => {
                    attempts += 1;
                    if attempts >= SLUG_ATTEMPTS {
                        return Err(AppError::Internal(
                            "Could not assign a unique slug".to_string(),
                        ));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !tags.is_empty() {
            self.attach_tags(post_id, tags).await?;
        }

        self.get_by_id(post_id)
            .await?
            .ok_or_else(|| AppError::Internal("Post vanished after insert".to_string()))
    }

    pub async fn get_by_id(&self, post_id: i64) -> AppResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, author_id, title, slug, body, status, premium, visit_count, published_at, created_at, updated_at
            FROM posts
            WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(post)
    }

    pub async fn get_by_slug(&self, slug: &str) -> AppResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, author_id, title, slug, body, status, premium, visit_count, published_at, created_at, updated_at
            FROM posts
            WHERE slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;

        Ok(post)
    }

    /// Bump the visit counter for a retrieved post.
    pub async fn record_visit(&self, post_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE posts SET visit_count = visit_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Published posts, premium ones only when the viewer may see them.
    pub async fn list_published(
        &self,
        include_premium: bool,
        order: PostOrder,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Post>> {
        let order_clause = match order {
            PostOrder::Newest => "published_at DESC",
            PostOrder::MostViewed => "visit_count DESC",
        };

        let query = format!(
            r#"
            SELECT id, author_id, title, slug, body, status, premium, visit_count, published_at, created_at, updated_at
            FROM posts
            WHERE status = 'published' AND (premium = 0 OR ?)
            ORDER BY {}
            LIMIT ? OFFSET ?
            "#,
            order_clause
        );

        let posts = sqlx::query_as::<_, Post>(&query)
            .bind(include_premium)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        Ok(posts)
    }

    /// Apply a partial update; publishing for the first time stamps
    /// `published_at`.
    pub async fn update_post(&self, post_id: i64, update: PostUpdate) -> AppResult<Post> {
        let current = self
            .get_by_id(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        let title = update.title.unwrap_or(current.title);
        let body = update.body.unwrap_or(current.body);
        let premium = update.premium.unwrap_or(current.premium);
        let status = match update.status {
            Some(s) => s.as_str().to_string(),
            None => current.status,
        };

        let published_at = if status == PostStatus::Published.as_str() {
            current.published_at.or_else(|| Some(Utc::now()))
        } else {
            current.published_at
        };

        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, body = ?, premium = ?, status = ?, published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&title)
        .bind(&body)
        .bind(premium)
        .bind(&status)
        .bind(published_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(post_id)
        .execute(&self.db)
        .await?;

        if let Some(tags) = update.tags {
            sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
                .bind(post_id)
                .execute(&self.db)
                .await?;
            self.attach_tags(post_id, &tags).await?;
        }

        self.get_by_id(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    /// Soft delete: the row survives with archived status.
    pub async fn archive_post(&self, post_id: i64) -> AppResult<()> {
        let result = sqlx::query("UPDATE posts SET status = 'archived', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(post_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        Ok(())
    }

    pub async fn tags_for_post(&self, post_id: i64) -> AppResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.name, t.slug
            FROM tags t
            JOIN post_tags pt ON pt.tag_id = t.id
            WHERE pt.post_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;

        Ok(tags)
    }

    /// Get-or-create each tag by slug and link it to the post.
    async fn attach_tags(&self, post_id: i64, tags: &[String]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for name in tags {
            let tag_slug = slugify(name);
            if tag_slug.is_empty() {
                continue;
            }

            sqlx::query("INSERT INTO tags (name, slug) VALUES (?, ?) ON CONFLICT(slug) DO NOTHING")
                .bind(name)
                .bind(&tag_slug)
                .execute(&mut *tx)
                .await?;

            let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE slug = ?")
                .bind(&tag_slug)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }
}
