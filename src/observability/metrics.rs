//! Metrics collection and exposition.
//!
//! # Metrics
//! - `agent_http_requests_total` (counter): requests by method, status
//! - `agent_http_request_duration_seconds` (histogram): latency distribution
//! - `agent_reloads_total` (counter): reload attempts by outcome
//! - `agent_plugins_loaded` (gauge): currently loaded plugins
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus endpoint is opt-in (`agent.metrics_address`)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "agent_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("agent_http_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("agent_reloads_total", "outcome" => outcome).increment(1);
}

pub fn set_plugins_loaded(count: usize) {
    metrics::gauge!("agent_plugins_loaded").set(count as f64);
}
