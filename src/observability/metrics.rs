//! Metrics collection and exposition.
//!
//! # Metrics
//! - `orchestrator_verifications_total` (counter): by secret kind, outcome
//! - `orchestrator_submissions_total` (counter): by outcome
//! - `orchestrator_tracker_events_total` (counter): by status
//! - `orchestrator_active_trackers` (gauge): live tracker tasks
//! - `orchestrator_tracking_duration_seconds` (histogram): submission to terminal
//! - `orchestrator_records_total` (counter): off-chain record transitions by status
//! - `orchestrator_ledger_health` (gauge): 1=reachable, 0=unreachable

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_verification(kind: &'static str, outcome: &'static str) {
    counter!("orchestrator_verifications_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_submission(outcome: &'static str) {
    counter!("orchestrator_submissions_total", "outcome" => outcome).increment(1);
}

pub fn record_tracker_event(status: &'static str) {
    counter!("orchestrator_tracker_events_total", "status" => status).increment(1);
}

pub fn record_active_trackers(count: usize) {
    gauge!("orchestrator_active_trackers").set(count as f64);
}

pub fn record_tracking_duration(elapsed: Duration) {
    histogram!("orchestrator_tracking_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_record_transition(status: &'static str) {
    counter!("orchestrator_records_total", "status" => status).increment(1);
}

pub fn record_ledger_health(healthy: bool) {
    gauge!("orchestrator_ledger_health").set(if healthy { 1.0 } else { 0.0 });
}
