//! Export stage.
//!
//! A fixed pool of workers shares the record queue and one backend. Each
//! record becomes one `http.request` span carrying every attribute of
//! [`AttributeRecord::attributes`]. Ending the span is the hand-off point;
//! the workers never retry.

pub mod backend;
pub mod otlp;
pub mod retry;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use netspan_core::record::{AttributeRecord, SPAN_NAME};

use crate::queue::SharedReceiver;
use crate::stats::PipelineStats;

pub use backend::{FinishedSpan, MemoryBackend, SpanBackend, SpanHandle};
pub use otlp::OtlpBackend;
pub use retry::{RetryPolicy, RetryingExporter};

/// Emits one span for `record`.
pub fn export_record<B: SpanBackend>(backend: &B, record: &AttributeRecord) {
    let mut span = backend.start_span(SPAN_NAME);
    for (key, value) in record.attributes() {
        span.set_attribute(key, value);
    }
    span.end();

    debug!(
        method = %record.method,
        target = %record.target,
        host = %record.host,
        status = record.status_code,
        client_ip = %record.peer_ip,
        request_body_size = record.request_body.len(),
        response_body_size = record.response_body.len(),
        "span exported"
    );
}

/// Spawns `workers` export tasks.
///
/// Workers exit when the record queue is closed and drained or when
/// `hard_stop` fires.
pub fn spawn_export_workers<B: SpanBackend>(
    workers: usize,
    records: SharedReceiver<AttributeRecord>,
    backend: Arc<B>,
    stats: Arc<PipelineStats>,
    hard_stop: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..workers)
        .map(|id| {
            let records = records.clone();
            let backend = Arc::clone(&backend);
            let stats = Arc::clone(&stats);
            let hard_stop = hard_stop.clone();

            tokio::spawn(async move {
                loop {
                    let record = tokio::select! {
                        biased;
                        _ = hard_stop.cancelled() => break,
                        next = records.recv() => match next {
                            Some(record) => record,
                            None => break,
                        },
                    };
                    export_record(backend.as_ref(), &record);
                    stats.record_exported();
                }
                debug!(worker = id, "export worker stopped");
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netspan_core::record::{
        ATTR_HTTP_METHOD, ATTR_HTTP_STATUS_CODE, ATTR_SENSOR_ID, AttributeValue, Scheme,
    };

    fn record(target: &str) -> AttributeRecord {
        AttributeRecord {
            method: "GET".to_owned(),
            target: target.to_owned(),
            host: "example.com".to_owned(),
            status_code: 200,
            scheme: Scheme::Http,
            sensor_id: "sensor".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn export_record_sets_every_attribute() {
        let backend = MemoryBackend::new();
        export_record(&backend, &record("/a"));

        let spans = backend.finished_spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "http.request");
        assert_eq!(span.attributes.len(), 15);
        assert_eq!(
            span.attribute(ATTR_HTTP_METHOD),
            Some(&AttributeValue::Str("GET".to_owned()))
        );
        assert_eq!(
            span.attribute(ATTR_HTTP_STATUS_CODE),
            Some(&AttributeValue::Int(200))
        );
        assert_eq!(span.attribute(ATTR_SENSOR_ID).and_then(|v| v.as_str()), Some("sensor"));
    }

    #[tokio::test]
    async fn workers_export_each_record_once() {
        let (tx, rx) = crate::queue::bounded(4);
        let backend = Arc::new(MemoryBackend::new());
        let stats = Arc::new(PipelineStats::new());

        let handles = spawn_export_workers(
            3,
            rx,
            Arc::clone(&backend),
            Arc::clone(&stats),
            CancellationToken::new(),
        );

        for i in 0..10 {
            tx.send(record(&format!("/{i}"))).await.unwrap();
        }
        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }

        let mut targets: Vec<String> = backend
            .finished_spans()
            .iter()
            .filter_map(|s| s.attribute("http.target").and_then(|v| v.as_str()).map(str::to_owned))
            .collect();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), 10);
        assert_eq!(stats.snapshot().exported, 10);
    }
}
