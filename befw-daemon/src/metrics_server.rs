//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`.
//! Round-trip histograms (reconcile, report send) share one bucket layout.

use std::net::SocketAddr;

use anyhow::Result;
use befw_core::config::MetricsConfig;
use befw_core::metrics as m;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

/// Parses `listen_addr:port` into a socket address.
pub fn listen_address(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// Call once per process.
///
/// # Errors
///
/// - Endpoint other than `/metrics`
/// - Invalid listen address or socket binding failure
/// - Global recorder already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    let addr = listen_address(config)?;
    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(m::RECONCILE_DURATION_SECONDS.to_owned()),
            &m::ROUND_TRIP_DURATION_BUCKETS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(
                Matcher::Full(m::TELEMETRY_SEND_DURATION_SECONDS.to_owned()),
                &m::ROUND_TRIP_DURATION_BUCKETS,
            )
        })
        .map_err(|e| anyhow::anyhow!("invalid histogram buckets: {}", e))?
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}
