//! # Metrics
//!
//! Prometheus exposition for the counters and histograms recorded with the `metrics`
//! macros across the gateway:
//!
//! - `gateway_requests_total{service, outcome}`
//! - `gateway_upstream_duration_seconds{service}`
//!
//! Without an installed recorder the macros are no-ops, which is what tests rely on.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::core::error::{GatewayError, GatewayResult};

const UPSTREAM_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Install the global Prometheus recorder and return a handle for rendering
///
/// May only succeed once per process.
pub fn install_prometheus_recorder() -> GatewayResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("gateway_upstream_duration_seconds".to_string()),
            UPSTREAM_DURATION_BUCKETS,
        )
        .map_err(|e| GatewayError::config(format!("Failed to set histogram buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| GatewayError::internal(format!("Failed to install metrics recorder: {}", e)))
}
