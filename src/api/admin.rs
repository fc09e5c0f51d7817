/// Administrative endpoints. Every handler requires the admin
/// permission via the AdminUser extractor.
use crate::{
    activity::{ActionStatus, ActionType, ActivityEntry, EntityRef},
    auth::AdminUser,
    context::AppContext,
    error::{AppError, AppResult},
    roles::{Permission, Role},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

const ACTIVITY_DEFAULT_LIMIT: i64 = 100;
const ACTIVITY_MAX_LIMIT: i64 = 500;

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/roles", get(list_roles).post(create_role))
        .route("/api/admin/roles/seed", post(seed_roles))
        .route(
            "/api/admin/roles/:name",
            put(change_role_permissions).delete(delete_role),
        )
        .route("/api/admin/roles/:name/default", put(set_default_role))
        .route("/api/admin/users/:username/role", put(set_user_role))
        .route("/api/admin/users/:username/flags", put(set_user_flags))
        .route("/api/admin/users/:username", delete(delete_user))
        .route("/api/admin/activity", get(recent_activity))
}

/// Role with its permission names spelled out
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleResponse {
    id: i64,
    name: String,
    is_default: bool,
    permissions: Vec<&'static str>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        let permissions = role.permission_names();
        Self {
            id: role.id,
            name: role.name,
            is_default: role.is_default,
            permissions,
        }
    }
}

/// All registered roles
async fn list_roles(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<RoleResponse>>> {
    let roles = ctx.role_manager.list_roles().await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

/// Reseed the canonical roles. Idempotent: running twice leaves the
/// same masks as running once.
async fn seed_roles(
    State(ctx): State<AppContext>,
    admin: AdminUser,
) -> AppResult<Json<Vec<RoleResponse>>> {
    ctx.role_manager.seed_default_roles().await?;

    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Update,
            ActionStatus::Success,
            "reseeded canonical roles",
            None,
        )
        .await;

    let roles = ctx.role_manager.list_roles().await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateRoleRequest {
    name: String,
    /// Permission names granted at creation
    #[serde(default)]
    permissions: Vec<String>,
}

fn parse_permissions(names: &[String]) -> AppResult<Vec<Permission>> {
    names.iter().map(|n| Permission::from_str(n)).collect()
}

/// Create a role, optionally with an initial permission set
async fn create_role(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Json(req): Json<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleResponse>)> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Role name cannot be empty".to_string()));
    }
    let permissions = parse_permissions(&req.permissions)?;

    let mut role = ctx.role_manager.create_role(req.name.trim()).await?;
    for permission in permissions {
        role = ctx.role_manager.add_permission(role.id, permission).await?;
    }

    tracing::info!(admin_id = admin.0.user.id, role = %role.name, "Role created");
    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Create,
            ActionStatus::Success,
            &format!("created role {}", role.name),
            None,
        )
        .await;

    Ok((StatusCode::CREATED, Json(role.into())))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChangePermissionsRequest {
    /// Clear the whole mask before applying grants
    reset: bool,
    grant: Vec<String>,
    revoke: Vec<String>,
}

/// Adjust a role's permission mask. Grants and revokes are idempotent,
/// so replaying a request leaves the same mask.
async fn change_role_permissions(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(name): Path<String>,
    Json(req): Json<ChangePermissionsRequest>,
) -> AppResult<Json<RoleResponse>> {
    let role = ctx
        .role_manager
        .find_by_name(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No role named {}", name)))?;

    let grant = parse_permissions(&req.grant)?;
    let revoke = parse_permissions(&req.revoke)?;

    if req.reset {
        ctx.role_manager.reset_permissions(role.id).await?;
    }
    for permission in grant {
        ctx.role_manager.add_permission(role.id, permission).await?;
    }
    for permission in revoke {
        ctx.role_manager.remove_permission(role.id, permission).await?;
    }

    let updated = ctx
        .role_manager
        .get_role(role.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No role named {}", name)))?;

    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Update,
            ActionStatus::Success,
            &format!("changed permissions of role {}", updated.name),
            None,
        )
        .await;

    Ok(Json(updated.into()))
}

/// Mark a role as the registration default
async fn set_default_role(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(name): Path<String>,
) -> AppResult<Json<RoleResponse>> {
    let role = ctx
        .role_manager
        .find_by_name(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No role named {}", name)))?;

    ctx.role_manager.set_default(role.id).await?;

    let updated = ctx
        .role_manager
        .get_role(role.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No role named {}", name)))?;

    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Update,
            ActionStatus::Success,
            &format!("made {} the default role", updated.name),
            None,
        )
        .await;

    Ok(Json(updated.into()))
}

/// Delete a role. Users holding it keep their account but fail every
/// permission check until reassigned.
async fn delete_role(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    let role = ctx
        .role_manager
        .find_by_name(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No role named {}", name)))?;

    ctx.role_manager.delete_role(role.id).await?;

    tracing::info!(admin_id = admin.0.user.id, role = %name, "Role deleted");
    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Delete,
            ActionStatus::Success,
            &format!("deleted role {}", name),
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SetRoleRequest {
    /// Role name; null clears the assignment
    role: Option<String>,
}

/// Assign a role to a user by name
async fn set_user_role(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetRoleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user = ctx
        .account_manager
        .get_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user named {}", username)))?;

    let role = match &req.role {
        Some(name) => Some(
            ctx.role_manager
                .find_by_name(name)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("No role named {}", name)))?,
        ),
        None => None,
    };

    let role_id = role.as_ref().map(|r| r.id);
    ctx.account_manager.set_role(user.id, role_id).await?;

    let remarks = match &role {
        Some(r) => format!("assigned role {} to {}", r.name, user.username),
        None => format!("cleared role of {}", user.username),
    };
    tracing::info!(admin_id = admin.0.user.id, user_id = user.id, "{}", remarks);
    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Update,
            ActionStatus::Success,
            &remarks,
            Some(EntityRef::user(user.id)),
        )
        .await;

    Ok(Json(serde_json::json!({
        "username": user.username,
        "role": role.map(|r| r.name),
    })))
}

#[derive(Debug, Deserialize)]
struct SetFlagsRequest {
    premium: Option<bool>,
    active: Option<bool>,
}

/// Flip the premium or active flag on an account. Omitted fields are
/// left alone.
async fn set_user_flags(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetFlagsRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user = ctx
        .account_manager
        .get_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user named {}", username)))?;

    if let Some(premium) = req.premium {
        ctx.account_manager.set_premium(user.id, premium).await?;
    }
    if let Some(active) = req.active {
        ctx.account_manager.set_active(user.id, active).await?;
    }

    let updated = ctx
        .account_manager
        .get_user(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user named {}", username)))?;

    tracing::info!(
        admin_id = admin.0.user.id,
        user_id = updated.id,
        premium = updated.is_premium,
        active = updated.is_active,
        "User flags updated"
    );
    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Update,
            ActionStatus::Success,
            &format!("updated flags of {}", updated.username),
            Some(EntityRef::user(updated.id)),
        )
        .await;

    Ok(Json(serde_json::json!({
        "username": updated.username,
        "premium": updated.is_premium,
        "active": updated.is_active,
    })))
}

/// Delete an account. Posts, reactions, follows, notifications and the
/// user's own audit entries cascade away with the row.
async fn delete_user(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(username): Path<String>,
) -> AppResult<StatusCode> {
    let user = ctx
        .account_manager
        .get_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user named {}", username)))?;

    ctx.account_manager.delete_user(user.id).await?;

    tracing::info!(admin_id = admin.0.user.id, user_id = user.id, "User deleted");
    ctx.activity_logger
        .try_record(
            Some(admin.0.user.id),
            ActionType::Delete,
            ActionStatus::Success,
            &format!("deleted account {}", username),
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ActivityQuery {
    /// Restrict to one user's actions
    user_id: Option<i64>,
    limit: Option<i64>,
}

/// Recent audit log entries, newest first
async fn recent_activity(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Vec<ActivityEntry>>> {
    let limit = query
        .limit
        .unwrap_or(ACTIVITY_DEFAULT_LIMIT)
        .clamp(1, ACTIVITY_MAX_LIMIT);

    let entries = match query.user_id {
        Some(user_id) => ctx.activity_logger.list_for_user(user_id, limit).await?,
        None => ctx.activity_logger.list_recent(limit).await?,
    };

    Ok(Json(entries))
}
