//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rejections_total` (counter): gate failures by reason
//! - `gateway_upstream_failures_total` (counter): forward failures by kind
//! - `gateway_usage_record_failures_total` (counter): dropped audit records
//! - `gateway_rate_windows` (gauge): partner windows held in memory

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    counter!("gateway_rejections_total", "reason" => reason).increment(1);
}

pub fn record_upstream_failure(kind: &'static str) {
    counter!("gateway_upstream_failures_total", "kind" => kind).increment(1);
}

pub fn record_usage_failure() {
    counter!("gateway_usage_record_failures_total").increment(1);
}

pub fn record_rate_windows(count: usize) {
    gauge!("gateway_rate_windows").set(count as f64);
}
