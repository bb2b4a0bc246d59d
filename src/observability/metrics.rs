//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define load balancer metrics (requests, latency, retries, circuit trips)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-server and per-client metrics
//!
//! # Metrics
//! - `lb_requests_total` (counter): completed submissions by client, outcome
//! - `lb_request_duration_seconds` (histogram): per-attempt latency by client, server
//! - `lb_retries_total` (counter): retries by client, kind (same/next server)
//! - `lb_circuit_trips_total` (counter): attempts that opened a server's circuit
//! - `lb_server_health` (gauge): 1=up, 0=down
//! - `lb_server_list_size` (gauge): servers in a client's pool
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed (tests, library use)
//! - Labels for client, server, outcome

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// One finished submission.
pub fn record_request(client: &str, outcome: &'static str) {
    metrics::counter!("lb_requests_total", "client" => client.to_string(), "outcome" => outcome)
        .increment(1);
}

/// One attempt against a concrete server.
pub fn record_attempt(client: &str, server: &str, duration: Duration) {
    metrics::histogram!(
        "lb_request_duration_seconds",
        "client" => client.to_string(),
        "server" => server.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_retry(client: &str, kind: &'static str) {
    metrics::counter!("lb_retries_total", "client" => client.to_string(), "kind" => kind).increment(1);
}

pub fn record_circuit_trip(client: &str, server: &str) {
    metrics::counter!(
        "lb_circuit_trips_total",
        "client" => client.to_string(),
        "server" => server.to_string()
    )
    .increment(1);
}

pub fn record_server_health(client: &str, server: &str, up: bool) {
    metrics::gauge!(
        "lb_server_health",
        "client" => client.to_string(),
        "server" => server.to_string()
    )
    .set(if up { 1.0 } else { 0.0 });
}

pub fn record_server_list_size(client: &str, size: usize) {
    metrics::gauge!("lb_server_list_size", "client" => client.to_string()).set(size as f64);
}
