/// /api/auth endpoints: registration, sessions, verification, password
use crate::{
    account::{
        ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, RegisterResponse,
        TokenResponse, VerifyRequest,
    },
    activity::{ActionStatus, ActionType, EntityRef},
    api::middleware,
    auth::{guard, AuthUser, OptionalAuthUser},
    context::AppContext,
    db::models::User,
    error::{AppError, AppResult},
    metrics,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/refresh", post(refresh))
        .route(
            "/api/auth/verify",
            get(request_verification).post(submit_verification),
        )
        .route("/api/auth/password", put(change_password))
}

/// Issue a verification code and hand it to the mailer without blocking
/// the response. Send failures are logged, never surfaced.
async fn dispatch_code(ctx: &AppContext, user: &User) -> AppResult<()> {
    let Some(code) = ctx.otp_store.issue(user).await? else {
        return Ok(());
    };

    let mailer = ctx.mailer.clone();
    let email = user.email.clone();
    let username = user.username.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_otp_email(&email, &username, &code).await {
            tracing::warn!(error = %e, "Failed to send verification email");
        }
    });

    Ok(())
}

/// Register a new account and send the first verification code
async fn register(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthUser,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    guard::ensure_anonymous(&viewer)?;
    req.validate()?;

    let user = ctx
        .account_manager
        .register(&req.email, &req.username, &req.password, req.bio)
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "Account registered");
    metrics::record_registration();
    ctx.activity_logger
        .try_record(
            Some(user.id),
            ActionType::Create,
            ActionStatus::Success,
            "account registered",
            Some(EntityRef::user(user.id)),
        )
        .await;

    dispatch_code(&ctx, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            username: user.username,
            email: user.email,
        }),
    ))
}

/// Login with username or email, returning a token pair
async fn login(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthUser,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    guard::ensure_anonymous(&viewer)?;

    let user = match ctx
        .account_manager
        .login(&req.identifier, &req.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            metrics::record_login(false);
            ctx.activity_logger
                .try_record(
                    None,
                    ActionType::LoginFailed,
                    ActionStatus::Failed,
                    &format!("failed login for {}", req.identifier),
                    None,
                )
                .await;
            return Err(e);
        }
    };

    metrics::record_login(true);
    ctx.activity_logger
        .try_record(
            Some(user.id),
            ActionType::Login,
            ActionStatus::Success,
            "logged in",
            None,
        )
        .await;

    let pair = ctx.token_service.issue_pair(user.id)?;
    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    refresh_token: String,
}

/// Logout: blacklist the presented access token, and the refresh token
/// when the client supplies one
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<StatusCode> {
    let token = middleware::extract_bearer_token(&headers)
        .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

    ctx.revocation_store.blacklist(&token).await?;

    if let Some(Json(req)) = body {
        ctx.revocation_store.blacklist(&req.refresh_token).await?;
    }

    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Logout,
            ActionStatus::Success,
            "logged out",
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Rotate a refresh token into a fresh pair. The consumed token is
/// blacklisted so it cannot be replayed.
async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    // Structural validation before the blacklist lookup; both failures
    // surface the same generic error.
    let claims = ctx.token_service.decode_refresh(&req.refresh_token)?;
    if ctx.revocation_store.is_revoked(&req.refresh_token).await? {
        return Err(AppError::invalid_credentials());
    }

    let user = ctx
        .account_manager
        .get_user(claims.user_id()?)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;

    if !user.is_active {
        return Err(AppError::Authorization(
            "Account is deactivated".to_string(),
        ));
    }

    ctx.revocation_store.blacklist(&req.refresh_token).await?;

    let pair = ctx.token_service.issue_pair(user.id)?;
    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// Request a verification code by mail
async fn request_verification(
    State(ctx): State<AppContext>,
    auth: AuthUser,
) -> AppResult<Json<serde_json::Value>> {
    guard::ensure_unverified(&auth)?;
    ctx.rate_limiter.check_otp(auth.user.id)?;

    if ctx.otp_store.has_pending(auth.user.id).await? {
        return Err(AppError::Validation(
            "A verification code is already pending".to_string(),
        ));
    }

    dispatch_code(&ctx, &auth.user).await?;

    Ok(Json(serde_json::json!({
        "message": "Verification code sent"
    })))
}

/// Submit a verification code
async fn submit_verification(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Json(req): Json<VerifyRequest>,
) -> AppResult<Json<serde_json::Value>> {
    guard::ensure_unverified(&auth)?;
    req.validate()?;

    if !ctx.otp_store.validate(auth.user.id, &req.code).await? {
        ctx.activity_logger
            .try_record(
                Some(auth.user.id),
                ActionType::Update,
                ActionStatus::Failed,
                "verification code rejected",
                Some(EntityRef::user(auth.user.id)),
            )
            .await;
        return Err(AppError::Validation(
            "Invalid or expired verification code".to_string(),
        ));
    }

    ctx.account_manager.mark_verified(auth.user.id).await?;
    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Update,
            ActionStatus::Success,
            "account verified",
            Some(EntityRef::user(auth.user.id)),
        )
        .await;

    Ok(Json(serde_json::json!({
        "message": "Account verified"
    })))
}

/// Change password. Requires a verified account and a correct current
/// password; the new password must differ.
async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    guard::ensure_verified(&auth)?;
    req.validate()?;

    if req.current_password == req.new_password {
        return Err(AppError::Validation(
            "New password must differ from the current one".to_string(),
        ));
    }

    ctx.account_manager
        .change_password(auth.user.id, &req.current_password, &req.new_password)
        .await?;

    ctx.activity_logger
        .try_record(
            Some(auth.user.id),
            ActionType::Update,
            ActionStatus::Success,
            "password changed",
            Some(EntityRef::user(auth.user.id)),
        )
        .await;

    Ok(Json(serde_json::json!({
        "message": "Password updated"
    })))
}
