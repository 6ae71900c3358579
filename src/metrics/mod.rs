//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Bridge submissions, approvals and exits
//! - Relay requests and status lookups
//! - Token mapping resolution

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use tracing::warn;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "bridge_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "bridge_transactions_submitted_total",
        "Total bridge transactions submitted",
        &["chain_id", "direction"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "bridge_transactions_failed_total",
        "Total bridge submissions that failed",
        &["chain_id"]
    ).unwrap();

    pub static ref APPROVALS: CounterVec = register_counter_vec!(
        "bridge_approvals_total",
        "Total token approvals sent ahead of a bridge call",
        &["chain_id"]
    ).unwrap();

    pub static ref EXITS: CounterVec = register_counter_vec!(
        "bridge_exits_total",
        "Total exit transactions submitted",
        &["chain_id"]
    ).unwrap();

    // Relay metrics
    pub static ref RELAY_REQUESTS: CounterVec = register_counter_vec!(
        "bridge_relay_requests_total",
        "Relay requests by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref STATUS_QUERIES: CounterVec = register_counter_vec!(
        "bridge_status_queries_total",
        "Status lookups by answering source",
        &["chain_id", "source"]
    ).unwrap();

    // Mapping metrics
    pub static ref MAPPING_RESOLUTIONS: CounterVec = register_counter_vec!(
        "bridge_mapping_resolutions_total",
        "Token mapping resolutions by answering source",
        &["source"]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_tx_submitted(chain_id: u64, direction: &str) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string(), direction])
        .inc();
}

pub fn record_tx_failed(chain_id: u64) {
    TX_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_approval(chain_id: u64) {
    APPROVALS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_exit(chain_id: u64) {
    EXITS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_relay_request(outcome: &str) {
    RELAY_REQUESTS.with_label_values(&[outcome]).inc();
}

pub fn record_status_query(chain_id: u64, source: &str) {
    STATUS_QUERIES
        .with_label_values(&[&chain_id.to_string(), source])
        .inc();
}

pub fn record_mapping_resolution(source: &str) {
    MAPPING_RESOLUTIONS.with_label_values(&[source]).inc();
}
