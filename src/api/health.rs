/// Health and metrics endpoints
///
/// `/health` answers liveness with a version stamp; `/health/detailed`
/// checks each dependency and reports per-component status for
/// monitoring; `/metrics` renders the Prometheus registry.
use crate::{context::AppContext, error::AppResult, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    /// Application version
    pub version: String,

    /// Individual component checks
    pub checks: Vec<ComponentHealth>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status of an individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    /// "healthy", "degraded", or "unhealthy"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health and metrics routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/detailed", get(health_detailed))
        .route("/metrics", get(render_metrics))
}

/// Basic health check
async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Detailed health check with per-component statuses
async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let checks = vec![
        check_database(&ctx).await,
        check_cache(&ctx).await,
        check_mailer(&ctx),
    ];

    let overall_status = determine_overall_status(&checks);

    let status_code = match overall_status.as_str() {
        // Degraded still serves traffic
        "healthy" | "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    let health = HealthStatus {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
        message: if overall_status == "healthy" {
            None
        } else {
            Some("One or more components are unhealthy".to_string())
        },
    };

    (status_code, Json(health))
}

/// Prometheus metrics in text exposition format
async fn render_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

async fn ping_database(ctx: &AppContext) -> AppResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match ping_database(ctx).await {
        Ok(_) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
        },
    }
}

async fn check_cache(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match ctx.cache.ping().await {
        Ok(_) => ComponentHealth {
            name: "cache".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => ComponentHealth {
            name: "cache".to_string(),
            // OTP and revocation stop working without the cache
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
        },
    }
}

fn check_mailer(ctx: &AppContext) -> ComponentHealth {
    // Codes are logged instead of mailed when SMTP is absent
    let status = if ctx.mailer.is_configured() {
        "healthy"
    } else {
        "degraded"
    };

    ComponentHealth {
        name: "mailer".to_string(),
        status: status.to_string(),
        response_time_ms: None,
        error: None,
    }
}

/// Determine overall health status from individual checks
fn determine_overall_status(checks: &[ComponentHealth]) -> String {
    let unhealthy = checks.iter().filter(|c| c.status == "unhealthy").count();
    let degraded = checks.iter().filter(|c| c.status == "degraded").count();

    if unhealthy > 0 {
        "unhealthy".to_string()
    } else if degraded > 0 {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, status: &str) -> ComponentHealth {
        ComponentHealth {
            name: name.to_string(),
            status: status.to_string(),
            response_time_ms: None,
            error: None,
        }
    }

    #[test]
    fn test_all_healthy() {
        let checks = vec![component("database", "healthy"), component("cache", "healthy")];
        assert_eq!(determine_overall_status(&checks), "healthy");
    }

    #[test]
    fn test_degraded_component_degrades_overall() {
        let checks = vec![component("database", "healthy"), component("mailer", "degraded")];
        assert_eq!(determine_overall_status(&checks), "degraded");
    }

    #[test]
    fn test_unhealthy_wins_over_degraded() {
        let checks = vec![
            component("database", "unhealthy"),
            component("mailer", "degraded"),
        ];
        assert_eq!(determine_overall_status(&checks), "unhealthy");
    }
}
