/// Comment endpoints: threads under posts, edits and removal by id
use crate::{
    activity::{ActionStatus, ActionType, EntityRef},
    api::posts::visible_post,
    auth::{guard, AuthUser, OptionalAuthUser},
    blog::{Comment, CommentThread},
    context::AppContext,
    error::{AppError, AppResult},
    roles::Permission,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build comment routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/posts/:slug/comments",
            get(list_comments).post(create_comment),
        )
        .route("/api/comments/:id", put(update_comment).delete(delete_comment))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

/// Threaded comments for a post, oldest first
async fn list_comments(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<Vec<CommentThread>>> {
    let post = visible_post(&ctx, &slug, viewer.auth.as_ref()).await?;
    Ok(Json(ctx.comment_manager.list_for_post(post.id).await?))
}

/// Comment on a post, optionally as a reply to a top-level comment.
/// The post author hears about new comments; a reply notifies the
/// parent's author instead.
async fn create_comment(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(slug): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    guard::ensure_verified(&auth)?;
    guard::ensure_can(&auth, Permission::Comment)?;
    req.validate()?;

    let post = visible_post(&ctx, &slug, Some(&auth)).await?;

    let comment = ctx
        .comment_manager
        .create_comment(post.id, auth.user.id, &req.body, req.parent_id)
        .await?;

    let notify = match comment.parent_id {
        Some(parent_id) => {
            let parent = ctx.comment_manager.get_comment(parent_id).await?;
            parent
                .filter(|p| p.author_id != auth.user.id)
                .map(|p| {
                    (
                        p.author_id,
                        format!("{} replied to your comment.", auth.user.username),
                    )
                })
        }
        None if post.author_id != auth.user.id => Some((
            post.author_id,
            format!(
                "{} commented on your post \"{}\".",
                auth.user.username, post.title
            ),
        )),
        None => None,
    };

    if let Some((recipient, message)) = notify {
        if let Err(e) = ctx.notification_manager.publish(recipient, &message).await {
            tracing::warn!(error = %e, recipient, "Failed to publish comment notification");
        }
    }

    // Record first, then bind the entity once the insert id is known
    let log_id = ctx
        .activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Create,
            ActionStatus::Success,
            "commented on post",
            None,
        )
        .await;
    if let Some(log_id) = log_id {
        if let Err(e) = ctx
            .activity_logger
            .attach_entity(log_id, EntityRef::comment(comment.id))
            .await
        {
            tracing::warn!(error = %e, log_id, "Failed to backfill audit entity");
        }
    }

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Edit a comment. Authors edit their own; admins may edit any.
async fn update_comment(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    req.validate()?;

    let comment = ctx
        .comment_manager
        .get_comment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No comment with id {}", id)))?;

    guard::ensure_owner_or_admin(&auth, comment.author_id)?;

    let updated = ctx.comment_manager.update_comment(id, &req.body).await?;

    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Update,
            ActionStatus::Success,
            "edited comment",
            Some(EntityRef::comment(id)),
        )
        .await;

    Ok(Json(updated))
}

/// Remove a comment and its replies. Allowed for the author, comment
/// moderators, and admins.
async fn delete_comment(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let comment = ctx
        .comment_manager
        .get_comment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No comment with id {}", id)))?;

    if !auth.can(Permission::ModerateComments) {
        guard::ensure_owner_or_admin(&auth, comment.author_id)?;
    }

    ctx.comment_manager.delete_comment(id).await?;

    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Delete,
            ActionStatus::Success,
            "deleted comment",
            Some(EntityRef::comment(id)),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
