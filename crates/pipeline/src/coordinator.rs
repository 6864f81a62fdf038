//! Pipeline lifecycle.
//!
//! ```text
//! Starting -> Running -> Draining -> Stopped
//! ```
//!
//! [`Coordinator::run`] opens the input, wires
//!
//! ```text
//! Ingestor -> ingest queue -> N filter workers -> export queue -> N export workers -> backend
//! ```
//!
//! and runs until the shutdown future resolves or the input ends. Draining
//! cancels the ingestor first so no new events enter, then gives both pools
//! the grace window to empty the queues. If they have not finished by then,
//! the hard-stop token ends them at their next loop boundary and whatever is
//! still queued is discarded and counted. The backend is flushed and shut down
//! on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use netspan_core::config::NetspanConfig;
use netspan_core::error::NetspanError;

use crate::error::SpanPipelineError;
use crate::export::{SpanBackend, spawn_export_workers};
use crate::filter::{FilterPolicy, spawn_filter_workers};
use crate::ingest::{InputSource, Ingestor, OpenedInput};
use crate::queue;
use crate::stats::{PipelineReport, PipelineStats};

/// Lifecycle state, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl CoordinatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Owns the pipeline configuration and backend and runs the stages once.
pub struct Coordinator<B: SpanBackend> {
    config: NetspanConfig,
    backend: Arc<B>,
    stats: Arc<PipelineStats>,
    state: watch::Sender<CoordinatorState>,
    started: AtomicBool,
}

impl<B: SpanBackend> Coordinator<B> {
    /// Validates `config` and takes the backend.
    pub fn new(config: NetspanConfig, backend: Arc<B>) -> Result<Self, NetspanError> {
        config.validate()?;
        let (state, _) = watch::channel(CoordinatorState::Starting);
        Ok(Self {
            config,
            backend,
            stats: Arc::new(PipelineStats::new()),
            state,
            started: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Live counters.
    pub fn stats(&self) -> PipelineReport {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &NetspanConfig {
        &self.config
    }

    /// Runs the pipeline to completion.
    ///
    /// Returns an error only when startup fails (interface, sensor config or
    /// launch). Everything after startup, including a slow drain, ends in
    /// `Ok` with the final counters.
    pub async fn run<F>(
        &self,
        source: InputSource,
        shutdown: F,
    ) -> Result<PipelineReport, SpanPipelineError>
    where
        F: Future<Output = ()> + Send,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SpanPipelineError::AlreadyStarted);
        }

        let workers = self.config.pipeline.workers;
        info!(
            workers,
            grace_period_secs = self.config.pipeline.grace_period_secs,
            missing_fields = %self.config.pipeline.missing_fields,
            "starting pipeline"
        );

        let input = match OpenedInput::open(source, &self.config.sensor).await {
            Ok(input) => input,
            Err(e) => {
                error!(error = %e, "pipeline startup failed");
                self.close_backend().await;
                self.set_state(CoordinatorState::Stopped);
                return Err(e);
            }
        };

        let (event_tx, event_rx) = queue::bounded(workers);
        let (record_tx, record_rx) = queue::bounded(workers);
        let ingest_cancel = CancellationToken::new();
        let hard_stop = CancellationToken::new();

        let ingestor = Ingestor::new(event_tx, Arc::clone(&self.stats), ingest_cancel.clone())
            .with_max_line_length(self.config.pipeline.max_line_length);
        let mut ingest_task = tokio::spawn(ingestor.run(input));

        let mut handles = spawn_filter_workers(
            workers,
            event_rx.clone(),
            record_tx,
            Arc::new(FilterPolicy::from_config(&self.config)),
            Arc::clone(&self.stats),
            hard_stop.clone(),
        );
        handles.extend(spawn_export_workers(
            workers,
            record_rx.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.stats),
            hard_stop.clone(),
        ));

        self.set_state(CoordinatorState::Running);

        tokio::pin!(shutdown);
        let ingest_finished = tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                false
            }
            joined = &mut ingest_task => {
                if let Err(e) = joined {
                    error!(error = %e, "ingestor task failed");
                }
                info!("input ended");
                true
            }
        };

        self.set_state(CoordinatorState::Draining);
        ingest_cancel.cancel();
        if !ingest_finished {
            if let Err(e) = ingest_task.await {
                error!(error = %e, "ingestor task failed");
            }
        }

        let grace = self.config.pipeline.grace_period();
        let drain = join_all(handles);
        tokio::pin!(drain);
        let results = tokio::select! {
            results = &mut drain => results,
            _ = tokio::time::sleep(grace) => {
                warn!(
                    grace_period_secs = grace.as_secs(),
                    "grace period elapsed with work in flight, forcing stop"
                );
                hard_stop.cancel();
                drain.await
            }
        };

        for result in results {
            if let Err(e) = result {
                error!(error = %e, "pipeline worker failed");
            }
        }

        let events_left = event_rx.close_and_drain().await;
        let records_left = record_rx.close_and_drain().await;
        if events_left + records_left > 0 {
            warn!(
                events = events_left,
                records = records_left,
                "discarded queued items at hard stop"
            );
            self.stats.add_dropped_events(events_left as u64);
            self.stats.add_dropped_records(records_left as u64);
        }

        self.close_backend().await;
        self.set_state(CoordinatorState::Stopped);

        let report = self.stats.snapshot();
        info!(
            lines_read = report.lines_read,
            parse_errors = report.parse_errors,
            accepted = report.accepted,
            rejected = report.rejected(),
            exported = report.exported,
            dropped_events = report.dropped_events,
            dropped_records = report.dropped_records,
            "pipeline stopped"
        );
        Ok(report)
    }

    async fn close_backend(&self) {
        if let Err(e) = self.backend.force_flush().await {
            warn!(error = %e, "backend flush failed");
        }
        if let Err(e) = self.backend.shutdown().await {
            warn!(error = %e, "backend shutdown failed");
        }
    }

    fn set_state(&self, next: CoordinatorState) {
        info!(state = next.as_str(), "pipeline state changed");
        self.state.send_replace(next);
    }
}
