//! Metric names and descriptions.
//!
//! Every Prometheus metric the workspace records is named here; pipeline
//! stages call `metrics::counter!()` with these constants.
//!
//! # Naming
//!
//! - prefix: `netspan_`
//! - stage: `ingest_`, `filter_`, `export_`, `pipeline_`, `daemon_`
//! - suffix: `_total` for counters, none for gauges
//!
//! ```ignore
//! metrics::counter!(netspan_core::metrics::INGEST_LINES_TOTAL).increment(1);
//! ```

// ─── label keys ─────────────────────────────────────────────────────

/// Rejection reason label (host, content_type, body_size, missing_fields)
pub const LABEL_REASON: &str = "reason";

/// Crate version label on the build info gauge
pub const LABEL_VERSION: &str = "version";

/// Pipeline stage label on drop counters (event, record)
pub const LABEL_STAGE: &str = "stage";

// ─── ingest ─────────────────────────────────────────────────────────

/// Non-blank lines read from the sensor (counter)
pub const INGEST_LINES_TOTAL: &str = "netspan_ingest_lines_total";

/// Lines that were not a valid event (counter)
pub const INGEST_PARSE_ERRORS_TOTAL: &str = "netspan_ingest_parse_errors_total";

// ─── filter ─────────────────────────────────────────────────────────

/// Events turned into attribute records (counter)
pub const FILTER_ACCEPTED_TOTAL: &str = "netspan_filter_accepted_total";

/// Events dropped by policy (counter, label: reason)
pub const FILTER_REJECTED_TOTAL: &str = "netspan_filter_rejected_total";

// ─── export ─────────────────────────────────────────────────────────

/// Spans ended and handed to the backend (counter)
pub const EXPORT_SPANS_TOTAL: &str = "netspan_export_spans_total";

// ─── pipeline ───────────────────────────────────────────────────────

/// Events or records abandoned at shutdown (counter, label: stage)
pub const PIPELINE_DROPPED_TOTAL: &str = "netspan_pipeline_dropped_total";

// ─── daemon ─────────────────────────────────────────────────────────

/// Build information (gauge, always 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "netspan_daemon_build_info";

/// Registers HELP text for every metric.
///
/// Call once, after the global recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        INGEST_LINES_TOTAL,
        "Total number of non-blank lines read from the sensor"
    );
    describe_counter!(
        INGEST_PARSE_ERRORS_TOTAL,
        "Total number of sensor lines that failed to parse as an HTTP event"
    );
    describe_counter!(
        FILTER_ACCEPTED_TOTAL,
        "Total number of events accepted by the filter chain"
    );
    describe_counter!(
        FILTER_REJECTED_TOTAL,
        "Total number of events rejected by the filter chain, by reason"
    );
    describe_counter!(
        EXPORT_SPANS_TOTAL,
        "Total number of spans handed to the telemetry backend"
    );
    describe_counter!(
        PIPELINE_DROPPED_TOTAL,
        "Total number of events or records abandoned when the shutdown grace period ran out, by stage"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
