#![doc = include_str!("../README.md")]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use netspan_pipeline::{Coordinator, InputSource, OtlpBackend};
//!
//! let backend = Arc::new(OtlpBackend::new(&config)?);
//! let coordinator = Coordinator::new(config, backend)?;
//! let report = coordinator.run(InputSource::sensor(), shutdown_signal()).await?;
//! ```

pub mod coordinator;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod queue;
pub mod stats;

// --- re-exports ---

// lifecycle
pub use coordinator::{Coordinator, CoordinatorState};

// errors
pub use error::SpanPipelineError;

// stages
pub use export::{
    FinishedSpan, MemoryBackend, OtlpBackend, RetryPolicy, RetryingExporter, SpanBackend,
    SpanHandle, export_record,
};
pub use filter::{FilterPolicy, RejectReason, Rejection};
pub use ingest::{InputSource, Ingestor, OpenedInput};

// counters
pub use stats::{PipelineReport, PipelineStats};
