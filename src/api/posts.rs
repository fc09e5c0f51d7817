/// /api/posts endpoints: authoring, listing, likes and bookmarks
use crate::{
    activity::{ActionStatus, ActionType, EntityRef},
    auth::{guard, AuthUser, OptionalAuthUser},
    blog::{LikeEntry, Post, PostOrder, PostStatus, PostUpdate, Tag},
    context::AppContext,
    error::{AppError, AppResult},
    metrics,
    roles::Permission,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Build post routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/:slug",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/api/posts/:slug/likes", get(post_likes))
        .route("/api/posts/:slug/like", post(toggle_like))
        .route("/api/posts/:slug/bookmark", post(toggle_bookmark))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub body: String,
    #[serde(default)]
    pub premium: bool,
    /// False saves a draft instead of publishing
    #[serde(default = "default_publish")]
    pub publish: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_publish() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub body: Option<String>,
    pub premium: Option<bool>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<String>>,
}

/// List item: body trimmed to its overview
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub overview: String,
    pub author_id: i64,
    pub premium: bool,
    pub visit_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub published_at: Option<DateTime<Utc>>,
}

/// Full post with tags, counts, and the viewer's own reaction state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
    pub like_count: i64,
    pub comment_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListPostsQuery {
    pub order: PostOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Whether the viewer may see this post. Drafts and archived posts
/// belong to their author and admins; premium posts additionally need a
/// premium viewer.
fn can_view(post: &Post, viewer: Option<&AuthUser>) -> bool {
    let owner_or_admin = viewer
        .map(|a| a.user.id == post.author_id || a.is_admin())
        .unwrap_or(false);

    if owner_or_admin {
        return true;
    }

    if !post.is_published() {
        return false;
    }

    if post.premium {
        return viewer.map(|a| a.user.is_premium).unwrap_or(false);
    }

    true
}

/// Resolve a slug to a post the viewer may see. Hidden posts 404
/// exactly like missing ones.
pub(crate) async fn visible_post(
    ctx: &AppContext,
    slug: &str,
    viewer: Option<&AuthUser>,
) -> AppResult<Post> {
    let post = ctx
        .post_manager
        .get_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No post at {}", slug)))?;

    if !can_view(&post, viewer) {
        return Err(AppError::NotFound(format!("No post at {}", slug)));
    }

    Ok(post)
}

async fn post_response(
    ctx: &AppContext,
    post: Post,
    viewer: Option<&AuthUser>,
) -> AppResult<PostResponse> {
    let tags = ctx.post_manager.tags_for_post(post.id).await?;
    let like_count = ctx.reaction_manager.like_count(post.id).await?;
    let comment_count = ctx.comment_manager.count_for_post(post.id).await?;

    let (liked, bookmarked) = match viewer {
        Some(auth) => (
            Some(ctx.reaction_manager.is_liked(auth.user.id, post.id).await?),
            Some(
                ctx.reaction_manager
                    .is_bookmarked(auth.user.id, post.id)
                    .await?,
            ),
        ),
        None => (None, None),
    };

    Ok(PostResponse {
        post,
        tags,
        like_count,
        comment_count,
        liked,
        bookmarked,
    })
}

/// List published posts. Premium posts appear only for premium viewers
/// and admins.
async fn list_posts(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthUser,
    Query(query): Query<ListPostsQuery>,
) -> AppResult<Json<Vec<PostSummary>>> {
    let include_premium = viewer
        .auth
        .as_ref()
        .map(|a| a.user.is_premium || a.is_admin())
        .unwrap_or(false);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let posts = ctx
        .post_manager
        .list_published(include_premium, query.order, limit, offset)
        .await?;

    let mut summaries = Vec::with_capacity(posts.len());
    for post in posts {
        let like_count = ctx.reaction_manager.like_count(post.id).await?;
        let comment_count = ctx.comment_manager.count_for_post(post.id).await?;
        let overview = post.overview();
        summaries.push(PostSummary {
            id: post.id,
            slug: post.slug,
            title: post.title,
            overview,
            author_id: post.author_id,
            premium: post.premium,
            visit_count: post.visit_count,
            like_count,
            comment_count,
            published_at: post.published_at,
        });
    }

    Ok(Json(summaries))
}

/// Create a post. Requires a verified account with the write permission.
async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostResponse>)> {
    guard::ensure_verified(&auth)?;
    guard::ensure_can(&auth, Permission::Write)?;
    req.validate()?;

    let post = ctx
        .post_manager
        .create_post(
            auth.user.id,
            &req.title,
            &req.body,
            req.premium,
            req.publish,
            &req.tags,
        )
        .await?;

    tracing::info!(post_id = post.id, author_id = auth.user.id, slug = %post.slug, "Post created");
    metrics::record_post_created();
    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Create,
            ActionStatus::Success,
            "created post",
            Some(EntityRef::post(post.id)),
        )
        .await;

    let resp = post_response(&ctx, post, Some(&auth)).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// Fetch a post by slug and count the visit
async fn get_post(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<PostResponse>> {
    let mut post = visible_post(&ctx, &slug, viewer.auth.as_ref()).await?;

    ctx.post_manager.record_visit(post.id).await?;
    // The fetched copy predates the bump
    post.visit_count += 1;

    ctx.activity_logger
        .try_record(
            viewer.auth.as_ref().map(|a| a.user.id),
            ActionType::Read,
            ActionStatus::Success,
            "viewed post",
            Some(EntityRef::post(post.id)),
        )
        .await;

    let resp = post_response(&ctx, post, viewer.auth.as_ref()).await?;
    Ok(Json(resp))
}

/// Update a post. The author needs the edit permission; admins may edit
/// anything.
async fn update_post(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(slug): Path<String>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<PostResponse>> {
    req.validate()?;

    let post = visible_post(&ctx, &slug, Some(&auth)).await?;

    guard::ensure_owner_or_admin(&auth, post.author_id)?;
    if !auth.is_admin() {
        guard::ensure_can(&auth, Permission::EditArticle)?;
    }

    let updated = ctx
        .post_manager
        .update_post(
            post.id,
            PostUpdate {
                title: req.title,
                body: req.body,
                premium: req.premium,
                status: req.status,
                tags: req.tags,
            },
        )
        .await?;

    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Update,
            ActionStatus::Success,
            "updated post",
            Some(EntityRef::post(updated.id)),
        )
        .await;

    let resp = post_response(&ctx, updated, Some(&auth)).await?;
    Ok(Json(resp))
}

/// Delete a post. Archives rather than removing the row, so likes and
/// comments survive for the author.
async fn delete_post(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    let post = visible_post(&ctx, &slug, Some(&auth)).await?;

    guard::ensure_owner_or_admin(&auth, post.author_id)?;
    if !auth.is_admin() {
        guard::ensure_can(&auth, Permission::DeleteArticle)?;
    }

    ctx.post_manager.archive_post(post.id).await?;

    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Delete,
            ActionStatus::Success,
            "archived post",
            Some(EntityRef::post(post.id)),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Users who liked a post, newest first
async fn post_likes(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<Vec<LikeEntry>>> {
    let post = visible_post(&ctx, &slug, viewer.auth.as_ref()).await?;
    Ok(Json(ctx.reaction_manager.likes_for_post(post.id).await?))
}

/// Like or unlike a post. The author is notified of fresh likes from
/// other users.
async fn toggle_like(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    guard::ensure_can(&auth, Permission::Like)?;

    let post = visible_post(&ctx, &slug, Some(&auth)).await?;

    let outcome = ctx
        .reaction_manager
        .toggle_like(auth.user.id, post.id)
        .await?;
    metrics::record_toggle("like", outcome.is_on());

    if outcome.is_on() && post.author_id != auth.user.id {
        let message = format!(
            "{} liked your post \"{}\".",
            auth.user.username, post.title
        );
        if let Err(e) = ctx
            .notification_manager
            .publish(post.author_id, &message)
            .await
        {
            tracing::warn!(error = %e, author_id = post.author_id, "Failed to publish like notification");
        }
    }

    let (action, remarks) = if outcome.is_on() {
        (ActionType::Like, "liked post")
    } else {
        (ActionType::Unlike, "unliked post")
    };
    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            action,
            ActionStatus::Success,
            remarks,
            Some(EntityRef::post(post.id)),
        )
        .await;

    Ok(Json(serde_json::json!({ "active": outcome.is_on() })))
}

/// Bookmark or unbookmark a post. Bookmarks are private; nobody is
/// notified.
async fn toggle_bookmark(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    guard::ensure_can(&auth, Permission::Bookmark)?;

    let post = visible_post(&ctx, &slug, Some(&auth)).await?;

    let outcome = ctx
        .reaction_manager
        .toggle_bookmark(auth.user.id, post.id)
        .await?;
    metrics::record_toggle("bookmark", outcome.is_on());

    let (action, remarks) = if outcome.is_on() {
        (ActionType::Bookmark, "bookmarked post")
    } else {
        (ActionType::Unbookmark, "removed bookmark")
    };
    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            action,
            ActionStatus::Success,
            remarks,
            Some(EntityRef::post(post.id)),
        )
        .await;

    Ok(Json(serde_json::json!({ "active": outcome.is_on() })))
}
