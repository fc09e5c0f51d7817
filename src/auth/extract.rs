/// Authentication extractors
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::models::User,
    error::AppError,
    error::AppResult,
    roles::Permission,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated caller: the user row plus the permission mask of their
/// role, resolved once at extraction time.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub permissions: i64,
}

impl AuthUser {
    /// Check a capability against the resolved mask
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions & permission.bit() == permission.bit()
    }

    /// Admin status is derived from the admin permission bit, never
    /// stored on the user.
    pub fn is_admin(&self) -> bool {
        self.can(Permission::Admin)
    }
}

/// Validate a bearer token and load its user.
///
/// Signature and expiry are checked before the revocation blacklist so
/// the response never distinguishes a revoked token from an invalid
/// one.
pub async fn authenticate_token(state: &AppContext, token: &str) -> AppResult<AuthUser> {
    let claims = state.token_service.decode_access(token)?;

    if state.revocation_store.is_revoked(token).await? {
        return Err(AppError::invalid_credentials());
    }

    let user_id = claims.user_id()?;
    let user = state
        .account_manager
        .get_user(user_id)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;

    if !user.is_active {
        return Err(AppError::Authorization("Account is deactivated".to_string()));
    }

    let permissions = state.account_manager.permissions_for(&user).await?;

    Ok(AuthUser { user, permissions })
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        authenticate_token(state, &token).await
    }
}

/// Optional authentication - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthUser {
    pub auth: Option<AuthUser>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(token) => authenticate_token(state, &token).await.ok(),
            None => None,
        };

        Ok(OptionalAuthUser { auth })
    }
}

/// Authenticated caller holding the admin permission
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppContext> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;

        if !auth.is_admin() {
            tracing::warn!(user_id = auth.user.id, "admin access denied");
            return Err(AppError::Authorization("Admin permission required".to_string()));
        }

        Ok(AdminUser(auth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::mask_of;
    use chrono::Utc;

    fn auth_user(permissions: i64) -> AuthUser {
        AuthUser {
            user: User {
                id: 1,
                email: "a@example.com".to_string(),
                username: "a".to_string(),
                password_hash: "x".to_string(),
                bio: None,
                verified: true,
                is_premium: false,
                is_active: true,
                role_id: Some(1),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            permissions,
        }
    }

    #[test]
    fn test_can_checks_mask() {
        let auth = auth_user(mask_of(&[Permission::Like, Permission::Comment]));
        assert!(auth.can(Permission::Like));
        assert!(!auth.can(Permission::Write));
    }

    #[test]
    fn test_is_admin_derived_from_mask() {
        assert!(!auth_user(mask_of(&[Permission::Like])).is_admin());
        assert!(auth_user(mask_of(&[Permission::Admin])).is_admin());
    }

    #[test]
    fn test_empty_mask_denies_everything() {
        let auth = auth_user(0);
        for p in Permission::ALL {
            assert!(!auth.can(p));
        }
    }
}
