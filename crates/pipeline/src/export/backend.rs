//! Telemetry backend abstraction.
//!
//! Export workers only start spans, set attributes and end them. Everything
//! after `end()` (batching, transport, retries) belongs to the backend.
//!
//! [`SpanBackend`] is implemented by [`OtlpBackend`](super::otlp::OtlpBackend)
//! for production and by [`MemoryBackend`] for tests and dry runs.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use netspan_core::record::AttributeValue;

use crate::error::SpanPipelineError;

/// A started span.
pub trait SpanHandle: Send {
    /// Sets one attribute. Later values for the same key win.
    fn set_attribute(&mut self, key: &'static str, value: AttributeValue);

    /// Ends the span and hands it to the backend.
    fn end(self);
}

/// Destination for finished spans.
pub trait SpanBackend: Send + Sync + 'static {
    type Span: SpanHandle;

    /// Starts a span with the given name.
    fn start_span(&self, name: &'static str) -> Self::Span;

    /// Exports everything ended so far.
    fn force_flush(&self) -> impl Future<Output = Result<(), SpanPipelineError>> + Send;

    /// Flushes and releases the backend. Spans started afterwards are dropped.
    fn shutdown(&self) -> impl Future<Output = Result<(), SpanPipelineError>> + Send;
}

/// A span as recorded by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSpan {
    pub name: &'static str,
    pub attributes: Vec<(&'static str, AttributeValue)>,
}

impl FinishedSpan {
    /// Value of `key`, if set.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// Backend that keeps finished spans in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    spans: Arc<Mutex<Vec<FinishedSpan>>>,
    flushes: Arc<Mutex<usize>>,
    shut_down: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans ended so far.
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.lock().map(|n| *n).unwrap_or_default()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

/// Span handle of [`MemoryBackend`].
#[derive(Debug)]
pub struct MemorySpan {
    span: FinishedSpan,
    sink: Arc<Mutex<Vec<FinishedSpan>>>,
    enabled: bool,
}

impl SpanHandle for MemorySpan {
    fn set_attribute(&mut self, key: &'static str, value: AttributeValue) {
        self.span.attributes.push((key, value));
    }

    fn end(self) {
        if !self.enabled {
            return;
        }
        if let Ok(mut spans) = self.sink.lock() {
            spans.push(self.span);
        }
    }
}

impl SpanBackend for MemoryBackend {
    type Span = MemorySpan;

    fn start_span(&self, name: &'static str) -> MemorySpan {
        MemorySpan {
            span: FinishedSpan {
                name,
                attributes: Vec::new(),
            },
            sink: Arc::clone(&self.spans),
            enabled: !self.is_shut_down(),
        }
    }

    async fn force_flush(&self) -> Result<(), SpanPipelineError> {
        let mut flushes = self
            .flushes
            .lock()
            .map_err(|e| SpanPipelineError::BackendShutdown(e.to_string()))?;
        *flushes += 1;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SpanPipelineError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Err(SpanPipelineError::BackendShutdown(
                "backend already shut down".to_owned(),
            ));
        }
        Ok(())
    }
}
