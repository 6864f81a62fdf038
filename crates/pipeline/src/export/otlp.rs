//! OTLP/gRPC telemetry backend.
//!
//! ```text
//! end() -> BatchSpanProcessor (tokio) -> RetryingExporter -> tonic OTLP exporter -> collector
//! ```
//!
//! The tracer provider is owned by [`OtlpBackend`] rather than installed
//! globally. Build it once, share it by `Arc`, call
//! [`shutdown`](SpanBackend::shutdown) on the way out.

use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::trace::{Span as _, Tracer as _, TracerProvider as _};
use opentelemetry::{KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Span, Tracer, TracerProvider,
};
use tracing::{debug, info, warn};

use netspan_core::config::NetspanConfig;
use netspan_core::record::{AttributeValue, TRACER_NAME};

use super::backend::{SpanBackend, SpanHandle};
use super::retry::{RetryPolicy, RetryingExporter};
use crate::error::SpanPipelineError;

/// `service.name` resource attribute.
pub const SERVICE_NAME: &str = "netspan";

/// Span backend exporting over OTLP/gRPC.
#[derive(Debug)]
pub struct OtlpBackend {
    provider: TracerProvider,
    tracer: Tracer,
    shut_down: AtomicBool,
}

impl OtlpBackend {
    /// Builds the exporter, batch processor and tracer provider.
    ///
    /// Must be called from within a Tokio runtime. The gRPC connection is
    /// established lazily, so an unreachable collector is not an error here.
    pub fn new(config: &NetspanConfig) -> Result<Self, SpanPipelineError> {
        let endpoint = config.sensor.collector_endpoint();
        let otel = &config.otel;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint.clone())
            .with_timeout(otel.export_timeout())
            .build()
            .map_err(|e| SpanPipelineError::Backend(format!("{endpoint}: {e}")))?;

        let exporter = RetryingExporter::new(exporter, RetryPolicy::from_config(otel));

        let batch_config = BatchConfigBuilder::default()
            .with_max_queue_size(otel.max_queue_size)
            .with_max_export_batch_size(otel.max_batch_size)
            .with_scheduled_delay(otel.batch_timeout())
            .with_max_export_timeout(otel.export_timeout())
            .build();

        let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
            .with_batch_config(batch_config)
            .build();

        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", SERVICE_NAME),
                KeyValue::new("service.version", config.pipeline.sensor_version.clone()),
            ]))
            .build();

        let tracer = provider.tracer(TRACER_NAME);

        info!(
            endpoint = %endpoint,
            max_batch_size = otel.max_batch_size,
            max_queue_size = otel.max_queue_size,
            "OTLP backend ready"
        );

        Ok(Self {
            provider,
            tracer,
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Span handle of [`OtlpBackend`].
#[derive(Debug)]
pub struct OtlpSpan(Span);

fn to_otel_value(value: AttributeValue) -> Value {
    match value {
        AttributeValue::Str(s) => Value::from(s),
        AttributeValue::Int(i) => Value::I64(i),
    }
}

impl SpanHandle for OtlpSpan {
    fn set_attribute(&mut self, key: &'static str, value: AttributeValue) {
        self.0.set_attribute(KeyValue::new(key, to_otel_value(value)));
    }

    fn end(mut self) {
        self.0.end();
    }
}

impl SpanBackend for OtlpBackend {
    type Span = OtlpSpan;

    fn start_span(&self, name: &'static str) -> OtlpSpan {
        OtlpSpan(self.tracer.start(name))
    }

    async fn force_flush(&self) -> Result<(), SpanPipelineError> {
        let provider = self.provider.clone();
        // The SDK blocks the calling thread until the processor answers.
        let results = tokio::task::spawn_blocking(move || provider.force_flush())
            .await
            .map_err(|e| SpanPipelineError::Join(e.to_string()))?;

        let errors: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if errors.is_empty() {
            debug!("OTLP backend flushed");
            Ok(())
        } else {
            Err(SpanPipelineError::BackendShutdown(errors.join("; ")))
        }
    }

    async fn shutdown(&self) -> Result<(), SpanPipelineError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.shutdown())
            .await
            .map_err(|e| SpanPipelineError::Join(e.to_string()))?
            .map_err(|e| SpanPipelineError::BackendShutdown(e.to_string()))?;
        info!("OTLP backend shut down");
        Ok(())
    }
}

impl Drop for OtlpBackend {
    fn drop(&mut self) {
        // The provider shuts its processors down when its last handle drops.
        if !self.shut_down.load(Ordering::SeqCst) {
            warn!("OTLP backend dropped without shutdown, unflushed spans may be lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_values_convert() {
        assert_eq!(to_otel_value(AttributeValue::Int(200)), Value::I64(200));
        assert_eq!(
            to_otel_value(AttributeValue::Str("GET".to_owned())),
            Value::from("GET")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backend_builds_and_shuts_down_without_collector() {
        let mut config = NetspanConfig::default();
        config.sensor.sensor_id = "6f1c2a8e-3d4b-4c5a-9e7f-0a1b2c3d4e5f".to_owned();
        // nothing listens here; the connection is lazy
        config.sensor.otel_collector_endpoint = "127.0.0.1:1".to_owned();
        config.otel.export_timeout_secs = 1;
        config.otel.retry_initial_interval_ms = 10;
        config.otel.retry_max_interval_ms = 20;
        config.otel.retry_max_elapsed_secs = 1;

        let backend = OtlpBackend::new(&config).unwrap();
        let mut span = backend.start_span("http.request");
        span.set_attribute("http.method", "GET".into());
        span.end();

        // export fails but shutdown still completes
        let _ = backend.shutdown().await;
        assert!(backend.shutdown().await.is_ok());
    }
}
