/// API routes and handlers
pub mod admin;
pub mod auth;
pub mod comments;
pub mod health;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod users;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(notifications::routes())
        .merge(admin::routes())
        .merge(health::routes())
}
