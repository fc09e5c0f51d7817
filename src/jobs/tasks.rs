/// Background task implementations
use std::time::Instant;

use chrono::{Duration, Utc};

use crate::{context::AppContext, error::AppResult, metrics};

/// Read notifications older than this are dropped
const NOTIFICATION_RETENTION_DAYS: i64 = 30;

/// Activity log entries older than this are dropped
const ACTIVITY_RETENTION_DAYS: i64 = 90;

fn record_outcome(job_type: &str, started: Instant, ok: bool) {
    let status = if ok { "success" } else { "error" };
    metrics::record_background_job(job_type, status, started.elapsed().as_secs_f64());
}

/// Sweep expired entries out of the cache backend
pub async fn sweep_cache(ctx: &AppContext) -> AppResult<usize> {
    let started = Instant::now();
    let result = ctx.cache.sweep().await;
    record_outcome("cache_sweep", started, result.is_ok());
    result
}

/// Drop read notifications older than the retention window
pub async fn prune_notifications(ctx: &AppContext) -> AppResult<u64> {
    let started = Instant::now();
    let cutoff = Utc::now() - Duration::days(NOTIFICATION_RETENTION_DAYS);
    let result = ctx.notification_manager.prune_read_before(cutoff).await;
    record_outcome("notification_prune", started, result.is_ok());
    result
}

/// Trim activity log entries older than the retention window
pub async fn prune_activity_log(ctx: &AppContext) -> AppResult<u64> {
    let started = Instant::now();
    let cutoff = Utc::now() - Duration::days(ACTIVITY_RETENTION_DAYS);
    let result = ctx.activity_logger.prune_before(cutoff).await;
    record_outcome("activity_prune", started, result.is_ok());
    result
}

/// Health check - verify the database and cache answer
pub async fn health_check(ctx: &AppContext) -> AppResult<()> {
    let started = Instant::now();
    let result: AppResult<()> = async {
        sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
        ctx.cache.ping().await?;
        Ok(())
    }
    .await;
    record_outcome("health_check", started, result.is_ok());
    result
}
