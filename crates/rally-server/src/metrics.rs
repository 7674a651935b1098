//! Metrics collection and export for Rally.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use rally_core::RegistryStats;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "rally_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "rally_connections_active";
    pub const MESSAGES_TOTAL: &str = "rally_messages_total";
    pub const MESSAGES_BYTES: &str = "rally_messages_bytes";
    pub const PARTIES_ACTIVE: &str = "rally_parties_active";
    pub const MEMBERS_ACTIVE: &str = "rally_members_active";
    pub const LATENCY_SECONDS: &str = "rally_latency_seconds";
    pub const ERRORS_TOTAL: &str = "rally_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages processed");
    metrics::describe_gauge!(names::PARTIES_ACTIVE, "Current number of live parties");
    metrics::describe_gauge!(names::MEMBERS_ACTIVE, "Current number of party members");
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound message processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a message.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record message latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Update party and member gauges.
pub fn set_registry(stats: RegistryStats) {
    gauge!(names::PARTIES_ACTIVE).set(stats.party_count as f64);
    gauge!(names::MEMBERS_ACTIVE).set(stats.member_count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
