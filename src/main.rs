/// Soliloquy - Social Blogging Backend
///
/// A Rust backend for a social blogging platform: role-based
/// permissions, email verification, revocable tokens, live
/// notifications, and an activity audit trail.

mod account;
mod activity;
mod api;
mod auth;
mod blog;
mod cache;
mod config;
mod context;
mod db;
mod error;
mod follows;
mod jobs;
mod mailer;
mod metrics;
mod notify;
mod rate_limit;
mod roles;
mod server;

use config::AppConfig;
use context::AppContext;
use error::AppResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soliloquy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Print banner
    print_banner();

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ____        _ _ _
 / ___|  ___ | (_) | ___   __ _ _   _ _   _
 \___ \ / _ \| | | |/ _ \ / _` | | | | | | |
  ___) | (_) | | | | (_) | (_| | |_| | |_| |
 |____/ \___/|_|_|_|\___/ \__, |\__,_|\__, |
                             |_|       |___/

        Social blogging backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
