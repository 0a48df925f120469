//! Prometheus metrics exposition
//!
//! - `dispatch_requests_total` (counter): labels `platform`, `result`
//! - `dispatch_duration_seconds` (histogram): label `result`
//! - `dispatch_attempts_total` (counter): labels `platform`, `kind` —
//!   emitted by the pool engine per publish attempt

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `dispatch_duration_seconds` with explicit buckets so it renders
/// as a histogram rather than the default summary. Boundaries cover 50ms to
/// 120s: a dispatch can chain several adapter calls, each up to the publish
/// timeout.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "dispatch_duration_seconds".to_string(),
            ),
            &[
                0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed dispatch request.
///
/// `result` is one of `success`, `content_rejected`, `failure`,
/// `exhausted`, `not_configured`, `error`.
pub fn record_dispatch(platform: &str, result: &'static str, duration_secs: f64) {
    metrics::counter!(
        "dispatch_requests_total",
        "platform" => platform.to_string(),
        "result" => result
    )
    .increment(1);
    metrics::histogram!("dispatch_duration_seconds", "result" => result)
        .record(duration_secs);
}
