use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background maintenance tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Spawn cleanup tasks
        tokio::spawn(Self::cache_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::notification_prune_job(Arc::clone(&self)));
        tokio::spawn(Self::activity_prune_job(Arc::clone(&self)));

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Sweep expired cache entries (runs every 10 minutes)
    async fn cache_sweep_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(600)); // Every 10 minutes

        loop {
            interval.tick().await;

            match tasks::sweep_cache(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cache sweep removed {} expired entries", count);
                    }
                }
                Err(e) => error!("Cache sweep failed: {}", e),
            }
        }
    }

    /// Prune read notifications past retention (runs daily)
    async fn notification_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(86400)); // Every 24 hours

        loop {
            interval.tick().await;
            info!("Running notification prune");

            match tasks::prune_notifications(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Pruned {} read notifications", count);
                    } else {
                        info!("Notification prune: nothing past retention");
                    }
                }
                Err(e) => error!("Failed to prune notifications: {}", e),
            }
        }
    }

    /// Trim the activity log past retention (runs daily)
    async fn activity_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(86400)); // Every 24 hours

        loop {
            interval.tick().await;
            info!("Running activity log prune");

            match tasks::prune_activity_log(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Pruned {} activity log entries", count);
                    }
                }
                Err(e) => error!("Failed to prune activity log: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - health is good
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
