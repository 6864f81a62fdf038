//! Ingest stage -- turns sensor output lines into [`HttpEvent`]s.
//!
//! One ingestor per pipeline. It reads newline-delimited JSON from the sensor
//! (or any [`AsyncRead`] standing in for it), skips blank, oversized and
//! malformed lines, and pushes events onto the bounded ingest queue. A full queue suspends the
//! reader, which in turn stalls the sensor's stdout pipe.

pub mod interface;
pub mod sensor;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netspan_core::config::{PipelineTuning, SensorSettings};
use netspan_core::event::HttpEvent;

use crate::error::SpanPipelineError;
use crate::stats::PipelineStats;

pub use interface::{SYS_CLASS_NET, resolve_interface};
pub use sensor::{SensorProcess, launch_sensor, render_sensor_config, sensor_argv};

/// Where events come from.
pub enum InputSource {
    /// Launch the configured sensor on the resolved interface.
    Sensor {
        /// Interface listing root, normally [`SYS_CLASS_NET`]
        sys_root: PathBuf,
    },
    /// Read NDJSON from an arbitrary stream (replay files, tests).
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl InputSource {
    /// The real sensor with the system interface list.
    pub fn sensor() -> Self {
        Self::Sensor {
            sys_root: PathBuf::from(SYS_CLASS_NET),
        }
    }

    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Stream(Box::new(reader))
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sensor { sys_root } => f
                .debug_struct("Sensor")
                .field("sys_root", sys_root)
                .finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An opened input, ready to be read by [`Ingestor::run`].
pub struct OpenedInput {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    child: Option<Child>,
}

impl OpenedInput {
    /// Resolves the interface and launches the sensor, or wraps the stream.
    ///
    /// Every failure here is fatal for the pipeline.
    pub async fn open(
        source: InputSource,
        settings: &SensorSettings,
    ) -> Result<Self, SpanPipelineError> {
        match source {
            InputSource::Sensor { sys_root } => {
                let interface =
                    resolve_interface(&settings.network_interface, &sys_root).await?;
                let SensorProcess { child, stdout } = launch_sensor(settings, &interface).await?;
                Ok(Self {
                    reader: Box::new(stdout),
                    child: Some(child),
                })
            }
            InputSource::Stream(reader) => Ok(Self {
                reader,
                child: None,
            }),
        }
    }
}

/// Read size for each pull from the sensor pipe.
const READ_CHUNK: usize = 8 * 1024;

/// Reads the input and feeds the ingest queue.
pub struct Ingestor {
    events: mpsc::Sender<HttpEvent>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    max_line_length: usize,
}

impl Ingestor {
    pub fn new(
        events: mpsc::Sender<HttpEvent>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events,
            stats,
            cancel,
            max_line_length: PipelineTuning::default().max_line_length,
        }
    }

    /// Lines longer than `max` bytes are discarded up to their newline and
    /// counted as parse errors.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Runs until EOF, a read error, a closed queue or cancellation.
    ///
    /// All of these are normal termination; the sensor (if any) is killed
    /// and reaped before returning. Dropping the ingestor closes the ingest
    /// queue's sending side.
    pub async fn run(self, input: OpenedInput) {
        let OpenedInput { reader, child } = input;
        self.read_loop(reader).await;

        if let Some(child) = child {
            stop_sensor(child).await;
        }
        debug!("ingestor stopped");
    }

    async fn read_loop(&self, mut reader: Box<dyn AsyncRead + Send + Unpin>) {
        let mut codec = LinesCodec::new_with_max_length(self.max_line_length);
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut eof = false;

        loop {
            let frame = if eof {
                codec.decode_eof(&mut buf)
            } else {
                codec.decode(&mut buf)
            };

            match frame {
                Ok(Some(line)) => {
                    let Some(event) = self.decode(&line) else {
                        continue;
                    };
                    if !self.forward(event).await {
                        return;
                    }
                    continue;
                }
                Ok(None) if eof => {
                    info!("sensor output ended");
                    return;
                }
                Ok(None) => {}
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(
                        max_line_length = self.max_line_length,
                        "skipping oversized sensor line"
                    );
                    self.stats.record_line();
                    self.stats.record_parse_error();
                    continue;
                }
                // the codec only reports invalid UTF-8 here, after consuming the line
                Err(LinesCodecError::Io(e)) => {
                    warn!(error = %e, "skipping non-UTF-8 sensor line");
                    self.stats.record_line();
                    self.stats.record_parse_error();
                    continue;
                }
            }

            buf.reserve(READ_CHUNK);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("ingest cancelled");
                    return;
                }
                read = reader.read_buf(&mut buf) => match read {
                    Ok(0) => eof = true,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "failed to read sensor output");
                        return;
                    }
                },
            }
        }
    }

    /// Sends one event, racing cancellation. `false` ends ingestion.
    async fn forward(&self, event: HttpEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("ingest cancelled while queue was full");
                self.stats.add_dropped_events(1);
                false
            }
            sent = self.events.send(event) => {
                if sent.is_err() {
                    warn!("ingest queue closed");
                    return false;
                }
                true
            }
        }
    }

    /// Parses one line; `None` for blank or malformed lines.
    fn decode(&self, line: &str) -> Option<HttpEvent> {
        if line.trim().is_empty() {
            return None;
        }
        self.stats.record_line();

        match HttpEvent::from_line(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, line_len = line.len(), "skipping malformed sensor line");
                self.stats.record_parse_error();
                None
            }
        }
    }
}

async fn stop_sensor(mut child: Child) {
    match child.try_wait() {
        Ok(Some(status)) => {
            info!(%status, "sensor exited");
            return;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to query sensor status"),
    }

    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to kill sensor");
    }
    match child.wait().await {
        Ok(status) => info!(%status, "sensor stopped"),
        Err(e) => warn!(error = %e, "failed to reap sensor"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const VALID: &str = r#"{"request":{"header":{"Host":"example.com"}}}"#;

    fn ingestor(capacity: usize) -> (Ingestor, mpsc::Receiver<HttpEvent>, Arc<PipelineStats>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(PipelineStats::new());
        let cancel = CancellationToken::new();
        (
            Ingestor::new(tx, Arc::clone(&stats), cancel.clone()),
            rx,
            stats,
            cancel,
        )
    }

    async fn opened(data: &'static [u8]) -> OpenedInput {
        OpenedInput::open(InputSource::stream(data), &SensorSettings::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn malformed_lines_skipped_valid_lines_flow() {
        let (ingestor, mut rx, stats, _cancel) = ingestor(8);
        let input: &'static [u8] = b"{not json\n\n   \n{\"request\":{\"header\":{\"Host\":\"example.com\"}}}\r\n[1,2]\n";

        ingestor.run(opened(input).await).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.host(), Some("example.com"));
        assert!(rx.recv().await.is_none());

        let report = stats.snapshot();
        assert_eq!(report.lines_read, 3);
        assert_eq!(report.parse_errors, 2);
    }

    #[tokio::test]
    async fn non_utf8_line_is_parse_error() {
        let (ingestor, mut rx, stats, _cancel) = ingestor(8);
        let input: &'static [u8] = b"\xff\xfe\n{}\n";

        ingestor.run(opened(input).await).await;

        assert!(rx.recv().await.is_some());
        assert_eq!(stats.snapshot().parse_errors, 1);
    }

    #[tokio::test]
    async fn oversized_line_skipped_next_line_flows() {
        // Given: a limit that fits the valid line exactly
        let (ingestor, mut rx, stats, _cancel) = ingestor(8);
        let ingestor = ingestor.with_max_line_length(VALID.len());
        let oversized = format!("{{\"pad\":\"{}\"}}", "x".repeat(VALID.len() - 10 + 1));
        assert_eq!(oversized.len(), VALID.len() + 1);
        let input = format!("{oversized}\n{VALID}\n");

        // When: an over-limit line precedes a valid one
        let opened = OpenedInput::open(
            InputSource::stream(std::io::Cursor::new(input.into_bytes())),
            &SensorSettings::default(),
        )
        .await
        .unwrap();
        ingestor.run(opened).await;

        // Then: the long line is a parse error and the next line still arrives
        let event = rx.recv().await.unwrap();
        assert_eq!(event.host(), Some("example.com"));
        assert!(rx.recv().await.is_none());
        let report = stats.snapshot();
        assert_eq!(report.lines_read, 2);
        assert_eq!(report.parse_errors, 1);
    }

    #[tokio::test]
    async fn oversized_line_spanning_many_reads_is_discarded() {
        let (ingestor, mut rx, stats, _cancel) = ingestor(8);
        let ingestor = ingestor.with_max_line_length(1024);
        let input = format!("{}\n{VALID}\n", "y".repeat(10 * READ_CHUNK));

        let opened = OpenedInput::open(
            InputSource::stream(std::io::Cursor::new(input.into_bytes())),
            &SensorSettings::default(),
        )
        .await
        .unwrap();
        ingestor.run(opened).await;

        assert!(rx.recv().await.is_some());
        assert_eq!(stats.snapshot().parse_errors, 1);
    }

    #[tokio::test]
    async fn last_line_without_newline_is_read() {
        let (ingestor, mut rx, _stats, _cancel) = ingestor(8);
        ingestor.run(opened(VALID.as_bytes()).await).await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn cancel_unblocks_full_queue() {
        // Given: a queue of one that nobody drains and an endless input
        let (ingestor, _rx, stats, cancel) = ingestor(1);
        let (mut writer, reader) = tokio::io::duplex(4096);
        let input = OpenedInput::open(InputSource::stream(reader), &SensorSettings::default())
            .await
            .unwrap();
        let task = tokio::spawn(ingestor.run(input));

        use tokio::io::AsyncWriteExt;
        for _ in 0..3 {
            writer.write_all(VALID.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
        }

        // When: cancelled while blocked on send
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        // Then: the ingestor returns promptly
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(stats.snapshot().dropped_events, 1);
    }

    #[tokio::test]
    async fn cancel_unblocks_idle_read() {
        let (ingestor, _rx, _stats, cancel) = ingestor(1);
        let (_writer, reader) = tokio::io::duplex(64);
        let input = OpenedInput::open(InputSource::stream(reader), &SensorSettings::default())
            .await
            .unwrap();
        let task = tokio::spawn(ingestor.run(input));

        cancel.cancel();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn sensor_source_reads_child_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let sys = dir.path().join("net");
        std::fs::create_dir_all(sys.join("eth0")).unwrap();
        std::fs::write(sys.join("eth0/flags"), "0x1003\n").unwrap();

        let template = dir.path().join("sensor.tmpl");
        std::fs::write(&template, format!("{VALID}\n")).unwrap();
        let settings = SensorSettings {
            sensor_config_template: template,
            sensor_config_path: dir.path().join("sensor.out"),
            sensor_command: vec!["cat".to_owned(), "{config}".to_owned()],
            ..Default::default()
        };

        let (ingestor, mut rx, _stats, _cancel) = ingestor(4);
        let input = OpenedInput::open(InputSource::Sensor { sys_root: sys }, &settings)
            .await
            .unwrap();
        ingestor.run(input).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.host(), Some("example.com"));
    }
}
