//! Pipeline counters.
//!
//! [`PipelineStats`] is shared by every stage through an `Arc`; each stage
//! bumps its own counters and mirrors them to the `metrics` facade.
//! [`PipelineReport`] is the snapshot returned when the pipeline stops.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use netspan_core::metrics as names;
use serde::Serialize;

use crate::filter::RejectReason;

/// Live counters.
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    parse_errors: AtomicU64,
    accepted: AtomicU64,
    rejected_host: AtomicU64,
    rejected_content_type: AtomicU64,
    rejected_body_size: AtomicU64,
    rejected_missing_fields: AtomicU64,
    exported: AtomicU64,
    dropped_events: AtomicU64,
    dropped_records: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
        counter!(names::INGEST_LINES_TOTAL).increment(1);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        counter!(names::INGEST_PARSE_ERRORS_TOTAL).increment(1);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        counter!(names::FILTER_ACCEPTED_TOTAL).increment(1);
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        let slot = match reason {
            RejectReason::Host => &self.rejected_host,
            RejectReason::ContentType => &self.rejected_content_type,
            RejectReason::BodySize => &self.rejected_body_size,
            RejectReason::MissingFields => &self.rejected_missing_fields,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!(names::FILTER_REJECTED_TOTAL, names::LABEL_REASON => reason.as_str())
            .increment(1);
    }

    pub fn record_exported(&self) {
        self.exported.fetch_add(1, Ordering::Relaxed);
        counter!(names::EXPORT_SPANS_TOTAL).increment(1);
    }

    /// Events read from the input but never filtered.
    pub fn add_dropped_events(&self, count: u64) {
        self.dropped_events.fetch_add(count, Ordering::Relaxed);
        counter!(names::PIPELINE_DROPPED_TOTAL, names::LABEL_STAGE => "event").increment(count);
    }

    /// Accepted records that never reached the backend.
    pub fn add_dropped_records(&self, count: u64) {
        self.dropped_records.fetch_add(count, Ordering::Relaxed);
        counter!(names::PIPELINE_DROPPED_TOTAL, names::LABEL_STAGE => "record").increment(count);
    }

    pub fn snapshot(&self) -> PipelineReport {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineReport {
            lines_read: load(&self.lines_read),
            parse_errors: load(&self.parse_errors),
            accepted: load(&self.accepted),
            rejected_host: load(&self.rejected_host),
            rejected_content_type: load(&self.rejected_content_type),
            rejected_body_size: load(&self.rejected_body_size),
            rejected_missing_fields: load(&self.rejected_missing_fields),
            exported: load(&self.exported),
            dropped_events: load(&self.dropped_events),
            dropped_records: load(&self.dropped_records),
        }
    }
}

/// Counters at the moment the pipeline stopped.
///
/// Once every stage has stopped the counters balance:
///
/// ```text
/// lines_read = parse_errors + accepted + rejected() + dropped_events
/// accepted   = exported + dropped_records
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Non-blank lines read from the sensor
    pub lines_read: u64,
    /// Lines that did not parse as an event
    pub parse_errors: u64,
    /// Events turned into records
    pub accepted: u64,
    pub rejected_host: u64,
    pub rejected_content_type: u64,
    pub rejected_body_size: u64,
    pub rejected_missing_fields: u64,
    /// Spans ended on the backend
    pub exported: u64,
    /// Events abandoned before filtering (ingest cancelled on a full queue,
    /// or still queued at hard stop)
    pub dropped_events: u64,
    /// Accepted records abandoned before export at hard stop
    pub dropped_records: u64,
}

impl PipelineReport {
    pub fn rejected(&self) -> u64 {
        self.rejected_host
            + self.rejected_content_type
            + self.rejected_body_size
            + self.rejected_missing_fields
    }

    /// Whether both balance equations hold.
    pub fn is_balanced(&self) -> bool {
        self.lines_read
            == self.parse_errors + self.accepted + self.rejected() + self.dropped_events
            && self.accepted == self.exported + self.dropped_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = PipelineStats::new();
        stats.record_line();
        stats.record_line();
        stats.record_parse_error();
        stats.record_accepted();
        stats.record_rejected(RejectReason::Host);
        stats.record_rejected(RejectReason::BodySize);
        stats.record_exported();

        let report = stats.snapshot();
        assert_eq!(report.lines_read, 2);
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected_host, 1);
        assert_eq!(report.rejected_body_size, 1);
        assert_eq!(report.rejected(), 2);
        assert_eq!(report.exported, 1);
        assert_eq!(report.dropped_events, 0);
        assert_eq!(report.dropped_records, 0);
    }

    #[test]
    fn drops_are_counted_per_stage() {
        // Given: three lines; one dropped before filtering, two accepted
        let stats = PipelineStats::new();
        for _ in 0..3 {
            stats.record_line();
        }
        stats.add_dropped_events(1);
        stats.record_accepted();
        stats.record_accepted();

        // When: one accepted record is exported and the other abandoned
        stats.record_exported();
        stats.add_dropped_records(1);

        // Then: each drop lands in its own counter and the report balances
        let report = stats.snapshot();
        assert_eq!(report.dropped_events, 1);
        assert_eq!(report.dropped_records, 1);
        assert!(report.is_balanced());
    }

    #[test]
    fn double_counted_drop_is_unbalanced() {
        let report = PipelineReport {
            lines_read: 2,
            accepted: 2,
            exported: 1,
            dropped_events: 1,
            dropped_records: 1,
            ..Default::default()
        };
        assert!(!report.is_balanced());
    }

    #[test]
    fn report_serializes() {
        let json = serde_json::to_string(&PipelineReport::default()).unwrap();
        assert!(json.contains("\"lines_read\":0"));
    }
}
