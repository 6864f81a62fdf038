//! Prometheus scrape endpoint.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`. Once
//! installed, every `metrics::counter!` bumped by the pipeline stages is
//! served at `http://{listen_addr}:{port}/metrics`.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use netspan_core::config::MetricsConfig;
use netspan_core::metrics as names;

/// Parses `listen_addr:port` into a socket address.
pub fn listen_socket(config: &MetricsConfig) -> Result<SocketAddr> {
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
/// - the listen address does not parse
/// - socket binding fails
/// - a global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_socket(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    names::describe_all();
    metrics::gauge!(names::DAEMON_BUILD_INFO, names::LABEL_VERSION => env!("CARGO_PKG_VERSION"))
        .set(1.0);

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_socket_parses() {
        let config = MetricsConfig::default();
        let addr = listen_socket(&config).unwrap();
        assert_eq!(addr.port(), 9464);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn listen_socket_rejects_garbage() {
        let config = MetricsConfig {
            listen_addr: "not-an-ip".to_owned(),
            ..Default::default()
        };
        assert!(listen_socket(&config).is_err());
    }
}
