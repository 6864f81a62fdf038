//! Exponential-backoff retry around an SDK span exporter.
//!
//! The batch processor calls [`SpanExporter::export`] once per batch. A failed
//! export is retried after `initial`, `2 * initial`, ... capped at
//! `max_interval`, until it succeeds or `max_elapsed` has passed since the
//! first attempt.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use opentelemetry::trace::TraceError;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use tokio::time::Instant;
use tracing::{debug, warn};

use netspan_core::config::OtelConfig;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OtelConfig) -> Self {
        Self {
            initial_interval: config.retry_initial_interval(),
            max_interval: config.retry_max_interval(),
            max_elapsed: config.retry_max_elapsed(),
        }
    }

    /// Delay that follows `previous`.
    pub fn next_interval(&self, previous: Duration) -> Duration {
        previous.saturating_mul(2).min(self.max_interval)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OtelConfig::default())
    }
}

/// Span exporter that retries failed batches of the wrapped exporter.
#[derive(Debug)]
pub struct RetryingExporter<E> {
    inner: Arc<Mutex<E>>,
    policy: RetryPolicy,
}

impl<E: SpanExporter + 'static> RetryingExporter<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            policy,
        }
    }
}

fn export_once<E: SpanExporter>(
    inner: &Mutex<E>,
    batch: Vec<SpanData>,
) -> BoxFuture<'static, ExportResult> {
    match inner.lock() {
        Ok(mut exporter) => exporter.export(batch),
        Err(_) => Box::pin(async { Err(TraceError::from("span exporter lock poisoned")) }),
    }
}

impl<E: SpanExporter + 'static> SpanExporter for RetryingExporter<E> {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let inner = Arc::clone(&self.inner);
        let policy = self.policy;

        Box::pin(async move {
            let started = Instant::now();
            let mut interval = policy.initial_interval;
            let mut attempt: u32 = 1;

            loop {
                let result = export_once(&inner, batch.clone()).await;
                let err = match result {
                    Ok(()) => {
                        if attempt > 1 {
                            debug!(attempt, spans = batch.len(), "span export succeeded after retry");
                        }
                        return Ok(());
                    }
                    Err(err) => err,
                };

                if started.elapsed() + interval > policy.max_elapsed {
                    warn!(
                        attempt,
                        spans = batch.len(),
                        error = %err,
                        "span export failed, giving up"
                    );
                    return Err(err);
                }

                warn!(
                    attempt,
                    retry_in_ms = interval.as_millis() as u64,
                    error = %err,
                    "span export failed, retrying"
                );
                tokio::time::sleep(interval).await;
                interval = policy.next_interval(interval);
                attempt += 1;
            }
        })
    }

    fn shutdown(&mut self) {
        if let Ok(mut exporter) = self.inner.lock() {
            exporter.shutdown();
        }
    }

    fn force_flush(&mut self) -> BoxFuture<'static, ExportResult> {
        match self.inner.lock() {
            Ok(mut exporter) => exporter.force_flush(),
            Err(_) => Box::pin(async { Err(TraceError::from("span exporter lock poisoned")) }),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.inner.lock() {
            exporter.set_resource(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` exports.
    #[derive(Debug)]
    struct FlakyExporter {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl SpanExporter for FlakyExporter {
        fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = call < self.failures;
            Box::pin(async move {
                if fail {
                    Err(TraceError::from("collector unavailable"))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(400),
            max_elapsed: Duration::from_secs(2),
        }
    }

    #[test]
    fn interval_doubles_and_caps() {
        let policy = policy();
        let mut interval = policy.initial_interval;
        let mut seen = vec![interval];
        for _ in 0..4 {
            interval = policy.next_interval(interval);
            seen.push(interval);
        }
        let ms: Vec<u128> = seen.iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![100, 200, 400, 400, 400]);
    }

    #[test]
    fn default_policy_matches_config_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.max_interval, Duration::from_secs(5));
        assert_eq!(policy.max_elapsed, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut exporter = RetryingExporter::new(
            FlakyExporter {
                failures: 2,
                calls: Arc::clone(&calls),
            },
            policy(),
        );

        exporter.export(Vec::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_elapsed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut exporter = RetryingExporter::new(
            FlakyExporter {
                failures: usize::MAX,
                calls: Arc::clone(&calls),
            },
            policy(),
        );

        let started = Instant::now();
        assert!(exporter.export(Vec::new()).await.is_err());

        // sleeps of 100 + 200 + 400 + 400 + 400 + 400 ms, the next would pass 2 s
        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert!(started.elapsed() <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn first_success_does_not_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut exporter = RetryingExporter::new(
            FlakyExporter {
                failures: 0,
                calls: Arc::clone(&calls),
            },
            policy(),
        );

        exporter.export(Vec::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
