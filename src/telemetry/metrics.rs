//! Prometheus metrics setup and metric definitions

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    // Common Prometheus defaults plus sub-millisecond buckets for fast endpoints.
    let buckets = vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)
        .context("failed to set histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines for all metrics from startup (not just after first use).
pub fn describe_metrics() {
    // HTTP metrics
    describe_counter!("gatekeeper_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "gatekeeper_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "gatekeeper_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    // Auth metrics
    describe_counter!(
        "gatekeeper_auth_login_total",
        "Total number of login attempts"
    );
    describe_counter!(
        "gatekeeper_auth_token_validation_total",
        "Token validations by outcome"
    );

    // Admission metrics
    describe_counter!(
        "gatekeeper_rate_limit_throttled_total",
        "Requests rejected by admission control, by limiter policy"
    );
    describe_gauge!(
        "gatekeeper_admission_queue_depth",
        "Requests waiting for a concurrency slot"
    );

    counter!("gatekeeper_auth_login_total", "result" => "success").absolute(0);
    counter!("gatekeeper_auth_token_validation_total", "result" => "valid").absolute(0);
    counter!("gatekeeper_rate_limit_throttled_total", "policy" => "ipLimit").absolute(0);
    gauge!("gatekeeper_admission_queue_depth").set(0.0);
    gauge!("gatekeeper_http_requests_in_flight").set(0.0);
}
