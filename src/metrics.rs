/// Metrics and telemetry
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Authentication outcomes
/// - Notification fan-out delivery
/// - Toggle activity (likes, bookmarks, follows)
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Account Metrics ==========

    /// Registrations
    pub static ref REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        "registrations_total",
        "Total number of accounts registered"
    )
    .unwrap();

    /// Login attempts by outcome
    pub static ref LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Total number of login attempts",
        &["status"]
    )
    .unwrap();

    /// Tokens added to the revocation blacklist
    pub static ref TOKENS_REVOKED_TOTAL: IntCounter = register_int_counter!(
        "tokens_revoked_total",
        "Total number of tokens blacklisted"
    )
    .unwrap();

    /// OTP validations by outcome
    pub static ref OTP_VALIDATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "otp_validations_total",
        "Total number of OTP validation attempts",
        &["outcome"]
    )
    .unwrap();

    // ========== Notification Metrics ==========

    /// Notifications persisted
    pub static ref NOTIFICATIONS_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        "notifications_published_total",
        "Total number of notifications persisted"
    )
    .unwrap();

    /// Live frames delivered to connected sessions
    pub static ref NOTIFICATION_FRAMES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        "notification_frames_delivered_total",
        "Total number of notification frames delivered to live sessions"
    )
    .unwrap();

    /// Connected notification sessions
    pub static ref NOTIFICATION_SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "notification_sessions_active",
        "Number of live notification WebSocket sessions"
    )
    .unwrap();

    // ========== Social Metrics ==========

    /// Toggle flips by kind and resulting state
    pub static ref TOGGLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "toggles_total",
        "Total number of toggle operations",
        &["kind", "state"]
    )
    .unwrap();

    /// Posts created
    pub static ref POSTS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "posts_created_total",
        "Total number of posts created"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a login attempt
pub fn record_login(success: bool) {
    LOGINS_TOTAL
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

/// Record an account registration
pub fn record_registration() {
    REGISTRATIONS_TOTAL.inc();
}

/// Record a token being blacklisted
pub fn record_token_revoked() {
    TOKENS_REVOKED_TOTAL.inc();
}

/// Record an OTP validation attempt
pub fn record_otp_validation(valid: bool) {
    OTP_VALIDATIONS_TOTAL
        .with_label_values(&[if valid { "valid" } else { "invalid" }])
        .inc();
}

/// Record a published notification and its live deliveries
pub fn record_notification_published(delivered: usize) {
    NOTIFICATIONS_PUBLISHED_TOTAL.inc();
    NOTIFICATION_FRAMES_DELIVERED_TOTAL.inc_by(delivered as u64);
}

/// Record a toggle flip
pub fn record_toggle(kind: &str, on: bool) {
    TOGGLES_TOTAL
        .with_label_values(&[kind, if on { "on" } else { "off" }])
        .inc();
}

/// Record a created post
pub fn record_post_created() {
    POSTS_CREATED_TOTAL.inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/posts", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_login_outcomes() {
        record_login(true);
        record_login(false);
        let metrics = render_metrics();
        assert!(metrics.contains("logins_total"));
        assert!(metrics.contains("success"));
        assert!(metrics.contains("failure"));
    }

    #[test]
    fn test_record_notification_delivery() {
        record_notification_published(2);
        let metrics = render_metrics();
        assert!(metrics.contains("notifications_published_total"));
        assert!(metrics.contains("notification_frames_delivered_total"));
    }

    #[test]
    fn test_record_toggles() {
        record_toggle("like", true);
        record_toggle("follow", false);
        let metrics = render_metrics();
        assert!(metrics.contains("toggles_total"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("cache_sweep", "success", 1.5);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }

    #[test]
    fn test_metrics_rendering() {
        record_http_request("GET", "/health", 200, 0.01);

        let metrics = render_metrics();
        assert!(metrics.contains("# HELP"));
        assert!(metrics.contains("# TYPE"));
    }
}
