//! Metrics collection and exposition.
//!
//! # Metrics
//! - `webrouter_health` (gauge): 1=up, 0 otherwise, labelled by component
//! - `webrouter_health_state` (gauge): raw state code, labelled by component
//! - `webrouter_snapshots_total` (counter): snapshots consumed, by outcome
//! - `webrouter_store_operations_total` (counter): KV operations, by kind and result
//! - `webrouter_reloads_total` (counter): proxy reloads, by result

use std::net::SocketAddr;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::HealthState;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_health(component: &'static str, state: HealthState) {
    gauge!("webrouter_health", "component" => component).set(f64::from(state.as_metric()));
    gauge!("webrouter_health_state", "component" => component).set(f64::from(state as u8));
}

pub fn record_snapshot(outcome: &'static str) {
    counter!("webrouter_snapshots_total", "outcome" => outcome).increment(1);
}

pub fn record_store_operation(kind: &'static str, success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("webrouter_store_operations_total", "kind" => kind, "result" => result).increment(1);
}

pub fn record_reload(success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("webrouter_reloads_total", "result" => result).increment(1);
}
