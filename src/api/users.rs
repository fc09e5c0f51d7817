/// /api/users endpoints: profiles and the follow graph
use crate::{
    account::ProfileResponse,
    activity::{ActionStatus, ActionType, EntityRef},
    auth::{guard, AuthUser, OptionalAuthUser},
    context::AppContext,
    error::{AppError, AppResult},
    follows::{FollowChange, FollowEntry},
    metrics,
    roles::Permission,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users/me/followers", get(my_followers))
        .route("/api/users/me/following", get(my_following))
        .route("/api/users/:username", get(get_profile))
        .route("/api/users/:username/follow", post(toggle_follow))
}

/// Profile plus the viewer's relationship to it
#[derive(Debug, Serialize)]
struct ProfileView {
    #[serde(flatten)]
    profile: ProfileResponse,
    /// Whether the viewer follows this user; absent for anonymous
    /// viewers and for the owner's own profile
    #[serde(skip_serializing_if = "Option::is_none")]
    following: Option<bool>,
}

/// Public profile. The email field is filled only when the viewer is
/// the profile owner or an admin.
async fn get_profile(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthUser,
    Path(username): Path<String>,
) -> AppResult<Json<ProfileView>> {
    let user = ctx
        .account_manager
        .get_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user named {}", username)))?;

    let include_email = viewer
        .auth
        .as_ref()
        .map(|a| a.user.id == user.id || a.is_admin())
        .unwrap_or(false);

    let following = match viewer.auth.as_ref() {
        Some(a) if a.user.id != user.id => {
            Some(ctx.follow_manager.is_following(a.user.id, user.id).await?)
        }
        _ => None,
    };

    let profile = ctx.account_manager.profile(&user, include_email).await?;
    Ok(Json(ProfileView { profile, following }))
}

/// Follow or unfollow a user. Following when already following
/// unfollows; the target is notified either way.
async fn toggle_follow(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    guard::ensure_can(&auth, Permission::Follow)?;

    let target = ctx
        .account_manager
        .get_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user named {}", username)))?;

    let change = ctx
        .follow_manager
        .toggle_follow(auth.user.id, target.id)
        .await?;

    let following = matches!(change, FollowChange::Followed);
    metrics::record_toggle("follow", following);

    let (action, remarks, message) = if following {
        (
            ActionType::Follow,
            format!("followed {}", target.username),
            format!("{} started following you.", auth.user.username),
        )
    } else {
        (
            ActionType::Unfollow,
            format!("unfollowed {}", target.username),
            format!("{} unfollowed you.", auth.user.username),
        )
    };

    // The follow row is already committed; a failed notification write
    // degrades instead of failing the request
    if let Err(e) = ctx.notification_manager.publish(target.id, &message).await {
        tracing::warn!(error = %e, target_id = target.id, "Failed to publish follow notification");
    }

    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            action,
            ActionStatus::Success,
            &remarks,
            Some(EntityRef::user(target.id)),
        )
        .await;

    Ok(Json(serde_json::json!({ "following": following })))
}

/// Users following the authenticated user
async fn my_followers(
    State(ctx): State<AppContext>,
    auth: AuthUser,
) -> AppResult<Json<Vec<FollowEntry>>> {
    Ok(Json(ctx.follow_manager.followers_of(auth.user.id).await?))
}

/// Users the authenticated user follows
async fn my_following(
    State(ctx): State<AppContext>,
    auth: AuthUser,
) -> AppResult<Json<Vec<FollowEntry>>> {
    Ok(Json(ctx.follow_manager.following_of(auth.user.id).await?))
}
