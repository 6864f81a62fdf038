//! Filter/map stage.
//!
//! A fixed pool of workers shares the ingest queue. Each event runs through an
//! ordered, short-circuiting chain:
//!
//! 1. host is in the accept set
//! 2. no request or response `Content-Type` contains a denied substring
//! 3. neither body exceeds the size limit
//! 4. required fields are present (see [`MissingFieldPolicy`])
//!
//! Accepted events become [`AttributeRecord`]s on the export queue. Rejected
//! events are logged with the client/server addresses, host and request line,
//! counted by reason, and dropped.

pub mod mapper;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use netspan_core::config::{MissingFieldPolicy, NetspanConfig};
use netspan_core::event::HttpEvent;
use netspan_core::record::AttributeRecord;

use crate::queue::SharedReceiver;
use crate::stats::PipelineStats;

pub use mapper::{ExtractedFields, RequestLine, parse_request_line, parse_status_code};

/// Rejection category, used as the metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Host,
    ContentType,
    BodySize,
    MissingFields,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::ContentType => "content_type",
            Self::BodySize => "body_size",
            Self::MissingFields => "missing_fields",
        }
    }
}

/// Why an event was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Host header missing or not in the accept set
    HostNotAccepted { host: Option<String> },
    /// A Content-Type header matched a deny pattern
    DeniedContentType {
        content_type: String,
        pattern: String,
    },
    /// A body exceeded the limit
    BodyTooLarge {
        side: &'static str,
        size: usize,
        max: usize,
    },
    /// Required fields were absent
    MissingFields(Vec<&'static str>),
}

impl Rejection {
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::HostNotAccepted { .. } => RejectReason::Host,
            Self::DeniedContentType { .. } => RejectReason::ContentType,
            Self::BodyTooLarge { .. } => RejectReason::BodySize,
            Self::MissingFields(_) => RejectReason::MissingFields,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostNotAccepted { host: Some(host) } => {
                write!(f, "host '{host}' is not accepted")
            }
            Self::HostNotAccepted { host: None } => f.write_str("no Host header"),
            Self::DeniedContentType {
                content_type,
                pattern,
            } => write!(f, "content type '{content_type}' matches '{pattern}'"),
            Self::BodyTooLarge { side, size, max } => {
                write!(f, "{side} body of {size} bytes exceeds {max}")
            }
            Self::MissingFields(fields) => {
                write!(f, "missing required fields: {}", fields.join(", "))
            }
        }
    }
}

/// Read-only filter configuration shared by every worker.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    accept_hosts: HashSet<String>,
    deny_content_types: Vec<String>,
    max_body_size: usize,
    missing_fields: MissingFieldPolicy,
    sensor_id: String,
    sensor_version: String,
}

impl FilterPolicy {
    pub fn from_config(config: &NetspanConfig) -> Self {
        Self {
            accept_hosts: config.sensor.accept_hosts.iter().cloned().collect(),
            deny_content_types: config
                .sensor
                .deny_content_types
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            max_body_size: config.pipeline.max_body_size,
            missing_fields: config.pipeline.missing_fields,
            sensor_id: config.sensor.sensor_id.clone(),
            sensor_version: config.pipeline.sensor_version.clone(),
        }
    }

    /// Runs the chain without consuming the event.
    pub fn check(&self, event: &HttpEvent) -> Result<ExtractedFields, Rejection> {
        self.check_host(event)?;
        self.check_content_type(event)?;
        self.check_body_size(event)?;
        mapper::extract_fields(event, self.missing_fields).map_err(Rejection::MissingFields)
    }

    /// Runs the chain and builds the record for an accepted event.
    pub fn evaluate(&self, event: HttpEvent) -> Result<AttributeRecord, Rejection> {
        let fields = self.check(&event)?;
        Ok(self.to_record(event, fields))
    }

    /// Builds the record for an event that passed [`check`](Self::check).
    pub fn to_record(&self, event: HttpEvent, fields: ExtractedFields) -> AttributeRecord {
        mapper::build_record(event, fields, &self.sensor_id, &self.sensor_version)
    }

    fn check_host(&self, event: &HttpEvent) -> Result<(), Rejection> {
        match event.host() {
            Some(host) if self.accept_hosts.contains(host) => Ok(()),
            host => Err(Rejection::HostNotAccepted {
                host: host.map(str::to_owned),
            }),
        }
    }

    fn check_content_type(&self, event: &HttpEvent) -> Result<(), Rejection> {
        let content_types = [event.request.content_type(), event.response.content_type()];
        for content_type in content_types.into_iter().flatten() {
            if let Some(pattern) = self
                .deny_content_types
                .iter()
                .find(|p| content_type.contains(p.as_str()))
            {
                return Err(Rejection::DeniedContentType {
                    content_type: content_type.to_owned(),
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_body_size(&self, event: &HttpEvent) -> Result<(), Rejection> {
        for (side, size) in [
            ("request", event.request.body_len()),
            ("response", event.response.body_len()),
        ] {
            if size > self.max_body_size {
                return Err(Rejection::BodyTooLarge {
                    side,
                    size,
                    max: self.max_body_size,
                });
            }
        }
        Ok(())
    }
}

/// Spawns `workers` filter tasks.
///
/// Workers exit when the ingest queue is closed and drained, when the export
/// queue is gone, or when `hard_stop` fires.
pub fn spawn_filter_workers(
    workers: usize,
    events: SharedReceiver<HttpEvent>,
    records: mpsc::Sender<AttributeRecord>,
    policy: Arc<FilterPolicy>,
    stats: Arc<PipelineStats>,
    hard_stop: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..workers)
        .map(|id| {
            let worker = FilterWorker {
                id,
                events: events.clone(),
                records: records.clone(),
                policy: Arc::clone(&policy),
                stats: Arc::clone(&stats),
                hard_stop: hard_stop.clone(),
            };
            tokio::spawn(worker.run())
        })
        .collect()
}

struct FilterWorker {
    id: usize,
    events: SharedReceiver<HttpEvent>,
    records: mpsc::Sender<AttributeRecord>,
    policy: Arc<FilterPolicy>,
    stats: Arc<PipelineStats>,
    hard_stop: CancellationToken,
}

impl FilterWorker {
    async fn run(self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.hard_stop.cancelled() => break,
                next = self.events.recv() => match next {
                    Some(event) => event,
                    None => break,
                },
            };

            let fields = match self.policy.check(&event) {
                Ok(fields) => fields,
                Err(rejection) => {
                    log_rejection(&event, &rejection);
                    self.stats.record_rejected(rejection.reason());
                    continue;
                }
            };

            let record = self.policy.to_record(event, fields);
            self.stats.record_accepted();

            tokio::select! {
                biased;
                _ = self.hard_stop.cancelled() => {
                    self.stats.add_dropped_records(1);
                    break;
                }
                sent = self.records.send(record) => {
                    if sent.is_err() {
                        warn!(worker = self.id, "export queue closed, filter worker stopping");
                        self.stats.add_dropped_records(1);
                        break;
                    }
                }
            }
        }
        debug!(worker = self.id, "filter worker stopped");
    }
}

fn log_rejection(event: &HttpEvent, rejection: &Rejection) {
    warn!(
        client_ip = %event.metadata.src_ip,
        server_ip = %event.metadata.dest_ip,
        host = event.host().unwrap_or_default(),
        request_line = event.request_line().unwrap_or_default(),
        reason = rejection.reason().as_str(),
        "event rejected: {}",
        rejection
    );
}
