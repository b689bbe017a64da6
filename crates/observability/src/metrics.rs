//! Prometheus metrics infrastructure
//!
//! This module provides utilities for exposing process-wide metrics over
//! an HTTP `/metrics` endpoint. The matching engine's own counters
//! (`matching_core::MatchingEngineMetrics`) are plain atomics read via
//! `AdmissionCoordinator::metrics()`; a boundary adapter that wants them on
//! this exporter registers them with the `metrics` crate's macros itself.
//! This module only owns exporter bootstrap.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize the Prometheus metrics exporter
///
/// This starts an HTTP server on the specified port that exposes metrics
/// at the `/metrics` endpoint.
///
/// # Arguments
///
/// * `port` - Port to expose metrics on
///
/// # Example
///
/// ```ignore
/// observability::metrics::init_metrics(9090)?;
/// // Metrics available at http://localhost:9090/metrics
/// ```
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}
