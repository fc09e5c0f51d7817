/// Authorization checks shared by the API handlers.
///
/// Handlers call these before touching state so every denial produces
/// the same error shape regardless of which route raised it.
use crate::{
    auth::extract::{AuthUser, OptionalAuthUser},
    error::AppError,
    error::AppResult,
    roles::Permission,
};

/// Require a single permission bit on the caller's role.
pub fn ensure_can(auth: &AuthUser, permission: Permission) -> AppResult<()> {
    if auth.can(permission) {
        return Ok(());
    }

    tracing::debug!(
        user_id = auth.user.id,
        permission = permission.as_str(),
        "permission denied"
    );

    Err(AppError::Authorization(format!(
        "Requires the {} permission",
        permission.as_str()
    )))
}

/// Require a verified email address.
pub fn ensure_verified(auth: &AuthUser) -> AppResult<()> {
    if auth.user.verified {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "Email address must be verified first".to_string(),
        ))
    }
}

/// Require an unverified account, for the verification endpoints.
pub fn ensure_unverified(auth: &AuthUser) -> AppResult<()> {
    if auth.user.verified {
        Err(AppError::Validation(
            "Account is already verified".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Require an anonymous caller, for login and registration. A stale or
/// invalid bearer token counts as anonymous.
pub fn ensure_anonymous(viewer: &OptionalAuthUser) -> AppResult<()> {
    match &viewer.auth {
        Some(auth) => {
            tracing::debug!(user_id = auth.user.id, "already authenticated");
            Err(AppError::Authorization("Already logged in".to_string()))
        }
        None => Ok(()),
    }
}

/// Require that the caller owns the resource or holds the admin bit.
pub fn ensure_owner_or_admin(auth: &AuthUser, owner_id: i64) -> AppResult<()> {
    if auth.user.id == owner_id || auth.is_admin() {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "Not the owner of this resource".to_string(),
        ))
    }
}
