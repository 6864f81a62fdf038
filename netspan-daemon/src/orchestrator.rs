//! Daemon assembly and lifecycle.
//!
//! The [`Orchestrator`] turns a validated [`NetspanConfig`] into a running
//! pipeline:
//!
//! 1. install the Prometheus recorder (when enabled)
//! 2. build the OTLP backend
//! 3. build the [`Coordinator`]
//! 4. install SIGTERM/SIGINT handlers
//! 5. run until a signal arrives or the sensor exits
//!
//! The backend is flushed and shut down by the coordinator on every exit
//! path, so nothing here needs to clean up after it.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal::unix::{Signal, SignalKind, signal};

use netspan_core::config::NetspanConfig;
use netspan_pipeline::{Coordinator, InputSource, OtlpBackend, PipelineReport, SpanBackend};

use crate::metrics_server;

/// Owns the coordinator for one daemon run.
pub struct Orchestrator<B: SpanBackend> {
    coordinator: Coordinator<B>,
}

impl Orchestrator<OtlpBackend> {
    /// Builds the production daemon: metrics endpoint, OTLP backend and
    /// coordinator.
    ///
    /// Must be called from within the Tokio runtime.
    pub fn build(config: NetspanConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let backend = OtlpBackend::new(&config)
            .map_err(|e| anyhow::anyhow!("failed to build telemetry backend: {}", e))?;
        Self::with_backend(config, Arc::new(backend))
    }

    /// Runs the sensor pipeline until SIGTERM/SIGINT or sensor exit.
    pub async fn run(self) -> Result<PipelineReport> {
        let signals = ShutdownSignals::install()?;
        self.run_with(InputSource::sensor(), signals.recv()).await
    }
}

impl<B: SpanBackend> Orchestrator<B> {
    /// Builds around an existing backend.
    pub fn with_backend(config: NetspanConfig, backend: Arc<B>) -> Result<Self> {
        let coordinator = Coordinator::new(config, backend)
            .map_err(|e| anyhow::anyhow!("failed to build pipeline: {}", e))?;
        Ok(Self { coordinator })
    }

    pub fn coordinator(&self) -> &Coordinator<B> {
        &self.coordinator
    }

    /// Runs the pipeline on `source` until `shutdown` resolves or the input
    /// ends.
    pub async fn run_with<F>(&self, source: InputSource, shutdown: F) -> Result<PipelineReport>
    where
        F: Future<Output = ()> + Send,
    {
        let config = self.coordinator.config();
        tracing::info!(
            sensor_id = %config.sensor.sensor_id,
            endpoint = %config.sensor.collector_endpoint(),
            accept_hosts = config.sensor.accept_hosts.len(),
            deny_content_types = config.sensor.deny_content_types.len(),
            "netspan-daemon starting"
        );

        let report = self
            .coordinator
            .run(source, shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("pipeline failed to start: {}", e))?;

        tracing::info!(
            exported = report.exported,
            rejected = report.rejected(),
            "netspan-daemon shut down"
        );
        Ok(report)
    }
}

/// SIGTERM and SIGINT handlers, installed before the pipeline starts.
pub struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    pub fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Resolves on the first SIGTERM or SIGINT.
    pub async fn recv(mut self) {
        let name = tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        };
        tracing::info!(signal = name, "received shutdown signal");
    }
}
