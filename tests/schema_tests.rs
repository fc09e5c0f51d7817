/// Schema tests
/// Runs the embedded migration set against a fresh in-memory SQLite
/// database and exercises the constraints the managers lean on.
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio_test::assert_err;

/// Single connection so every query sees the same in-memory database.
async fn migrated_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

async fn insert_user(pool: &SqlitePool, email: &str, username: &str) -> i64 {
    sqlx::query(
        r#"
        INSERT INTO users (email, username, password_hash, verified, is_premium, is_active, created_at, updated_at)
        VALUES (?, ?, 'x', 0, 0, 1, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .bind(email)
    .bind(username)
    .execute(pool)
    .await
    .expect("Failed to insert user")
    .last_insert_rowid()
}

async fn insert_post(pool: &SqlitePool, author_id: i64, slug: &str) -> i64 {
    sqlx::query(
        r#"
        INSERT INTO posts (author_id, title, slug, body, status, premium, visit_count, created_at, updated_at)
        VALUES (?, 'Title', ?, 'Body', 'published', 0, 0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .bind(author_id)
    .bind(slug)
    .execute(pool)
    .await
    .expect("Failed to insert post")
    .last_insert_rowid()
}

async fn count(pool: &SqlitePool, sql: &str, id: i64) -> i64 {
    sqlx::query_scalar(sql)
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}

#[tokio::test]
async fn test_migrations_create_all_tables() {
    let pool = migrated_pool().await;

    for table in [
        "roles",
        "users",
        "follows",
        "posts",
        "tags",
        "post_tags",
        "comments",
        "likes",
        "bookmarks",
        "notifications",
        "activity_log",
    ] {
        let found: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .expect("Failed to query sqlite_master");

        assert_eq!(found, 1, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_duplicate_username_and_email_rejected() {
    let pool = migrated_pool().await;
    insert_user(&pool, "alice@example.com", "alice").await;

    let same_username = sqlx::query(
        r#"
        INSERT INTO users (email, username, password_hash, verified, is_premium, is_active, created_at, updated_at)
        VALUES ('other@example.com', 'alice', 'x', 0, 0, 1, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await;
    assert_err!(same_username);

    let same_email = sqlx::query(
        r#"
        INSERT INTO users (email, username, password_hash, verified, is_premium, is_active, created_at, updated_at)
        VALUES ('alice@example.com', 'alice2', 'x', 0, 0, 1, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await;
    assert_err!(same_email);
}

#[tokio::test]
async fn test_duplicate_slug_rejected() {
    let pool = migrated_pool().await;
    let author = insert_user(&pool, "alice@example.com", "alice").await;
    insert_post(&pool, author, "hello-world").await;

    let dup = sqlx::query(
        r#"
        INSERT INTO posts (author_id, title, slug, body, status, premium, visit_count, created_at, updated_at)
        VALUES (?, 'Other', 'hello-world', 'Body', 'draft', 0, 0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .bind(author)
    .execute(&pool)
    .await;
    assert_err!(dup);
}

#[tokio::test]
async fn test_self_follow_rejected_by_check() {
    let pool = migrated_pool().await;
    let alice = insert_user(&pool, "alice@example.com", "alice").await;

    let result = sqlx::query(
        "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')",
    )
    .bind(alice)
    .bind(alice)
    .execute(&pool)
    .await;

    assert_err!(result);
}

#[tokio::test]
async fn test_duplicate_follow_pair_rejected() {
    let pool = migrated_pool().await;
    let alice = insert_user(&pool, "alice@example.com", "alice").await;
    let bob = insert_user(&pool, "bob@example.com", "bob").await;

    sqlx::query(
        "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')",
    )
    .bind(alice)
    .bind(bob)
    .execute(&pool)
    .await
    .expect("first follow inserts");

    let dup = sqlx::query(
        "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')",
    )
    .bind(alice)
    .bind(bob)
    .execute(&pool)
    .await;
    assert_err!(dup);

    // The reverse direction is a different pair and stays allowed
    sqlx::query(
        "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')",
    )
    .bind(bob)
    .bind(alice)
    .execute(&pool)
    .await
    .expect("reverse follow inserts");
}

#[tokio::test]
async fn test_duplicate_like_and_bookmark_rejected() {
    let pool = migrated_pool().await;
    let alice = insert_user(&pool, "alice@example.com", "alice").await;
    let post = insert_post(&pool, alice, "hello-world").await;

    for table in ["likes", "bookmarks"] {
        let insert = format!(
            "INSERT INTO {} (user_id, post_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')",
            table
        );

        sqlx::query(&insert)
            .bind(alice)
            .bind(post)
            .execute(&pool)
            .await
            .expect("first row inserts");

        let dup = sqlx::query(&insert).bind(alice).bind(post).execute(&pool).await;
        assert_err!(dup, "duplicate {} row accepted", table);
    }
}

#[tokio::test]
async fn test_deleting_post_cascades_children() {
    let pool = migrated_pool().await;
    let alice = insert_user(&pool, "alice@example.com", "alice").await;
    let bob = insert_user(&pool, "bob@example.com", "bob").await;
    let post = insert_post(&pool, alice, "hello-world").await;

    sqlx::query(
        "INSERT INTO comments (post_id, author_id, body, created_at, updated_at) VALUES (?, ?, 'Nice', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
    )
    .bind(post)
    .bind(bob)
    .execute(&pool)
    .await
    .expect("comment inserts");

    sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')")
        .bind(bob)
        .bind(post)
        .execute(&pool)
        .await
        .expect("like inserts");

    sqlx::query("INSERT INTO bookmarks (user_id, post_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')")
        .bind(bob)
        .bind(post)
        .execute(&pool)
        .await
        .expect("bookmark inserts");

    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(post)
        .execute(&pool)
        .await
        .expect("post deletes");

    assert_eq!(count(&pool, "SELECT count(*) FROM comments WHERE post_id = ?", post).await, 0);
    assert_eq!(count(&pool, "SELECT count(*) FROM likes WHERE post_id = ?", post).await, 0);
    assert_eq!(count(&pool, "SELECT count(*) FROM bookmarks WHERE post_id = ?", post).await, 0);
}

#[tokio::test]
async fn test_deleting_reply_parent_cascades_replies() {
    let pool = migrated_pool().await;
    let alice = insert_user(&pool, "alice@example.com", "alice").await;
    let post = insert_post(&pool, alice, "hello-world").await;

    let parent = sqlx::query(
        "INSERT INTO comments (post_id, author_id, body, created_at, updated_at) VALUES (?, ?, 'Top', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
    )
    .bind(post)
    .bind(alice)
    .execute(&pool)
    .await
    .expect("parent inserts")
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO comments (post_id, author_id, parent_id, body, created_at, updated_at) VALUES (?, ?, ?, 'Reply', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
    )
    .bind(post)
    .bind(alice)
    .bind(parent)
    .execute(&pool)
    .await
    .expect("reply inserts");

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(parent)
        .execute(&pool)
        .await
        .expect("parent deletes");

    assert_eq!(count(&pool, "SELECT count(*) FROM comments WHERE post_id = ?", post).await, 0);
}

#[tokio::test]
async fn test_deleting_role_keeps_users() {
    let pool = migrated_pool().await;

    let role = sqlx::query(
        "INSERT INTO roles (name, is_default, permissions, created_at) VALUES ('User', 1, 15, '2026-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .expect("role inserts")
    .last_insert_rowid();

    let alice = insert_user(&pool, "alice@example.com", "alice").await;
    sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
        .bind(role)
        .bind(alice)
        .execute(&pool)
        .await
        .expect("role assigns");

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role)
        .execute(&pool)
        .await
        .expect("role deletes");

    // ON DELETE SET NULL: the account survives with no role
    let role_id: Option<i64> = sqlx::query_scalar("SELECT role_id FROM users WHERE id = ?")
        .bind(alice)
        .fetch_one(&pool)
        .await
        .expect("user still present");
    assert_eq!(role_id, None);
}

#[tokio::test]
async fn test_activity_log_accepts_anonymous_rows() {
    let pool = migrated_pool().await;

    // Failed logins are recorded with no user id
    sqlx::query(
        "INSERT INTO activity_log (user_id, action, status, remarks, created_at) VALUES (NULL, 'LOGIN_FAILED', 'FAILED', 'failed login for ghost', '2026-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .expect("anonymous row inserts");

    let found: i64 =
        sqlx::query_scalar("SELECT count(*) FROM activity_log WHERE user_id IS NULL")
            .fetch_one(&pool)
            .await
            .expect("count queries");
    assert_eq!(found, 1);
}

#[tokio::test]
async fn test_concurrent_duplicate_follows_leave_one_row() {
    // Needs a file-backed database so separate connections race on the
    // same store; in-memory databases are per-connection.
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("race.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("Failed to open file-backed database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let alice = insert_user(&pool, "alice@example.com", "alice").await;
    let bob = insert_user(&pool, "bob@example.com", "bob").await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                sqlx::query(
                    "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, '2026-01-01T00:00:00Z')",
                )
                .bind(alice)
                .bind(bob)
                .execute(&pool)
                .await
            })
        })
        .collect();

    let mut inserted = 0;
    for task in tasks {
        if task.await.expect("insert task completes").is_ok() {
            inserted += 1;
        }
    }

    // One writer wins; the rest hit the unique pair constraint
    assert_eq!(inserted, 1);
    assert_eq!(
        count(&pool, "SELECT count(*) FROM follows WHERE follower_id = ?", alice).await,
        1
    );
}
