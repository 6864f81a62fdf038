//! Pipeline error types
//!
//! Only startup failures surface as [`SpanPipelineError`]. Per-event problems
//! (malformed lines, policy rejections) are logged and counted where they
//! happen and never become errors.

use netspan_core::error::{NetspanError, PipelineError};

/// Pipeline domain error.
#[derive(Debug, thiserror::Error)]
pub enum SpanPipelineError {
    /// No usable capture interface.
    #[error("no capture interface: {0}")]
    NoInterface(String),

    /// Sensor config template could not be rendered.
    #[error("sensor config error: {path}: {reason}")]
    SensorConfig {
        /// Template or output path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Sensor process could not be started.
    #[error("sensor launch failed: {0}")]
    SensorLaunch(String),

    /// Telemetry backend could not be built.
    #[error("backend error: {0}")]
    Backend(String),

    /// Flushing or shutting down the backend failed.
    #[error("backend shutdown error: {0}")]
    BackendShutdown(String),

    /// A coordinator runs once.
    #[error("coordinator already started")]
    AlreadyStarted,

    /// Worker task panicked or was aborted.
    #[error("worker join error: {0}")]
    Join(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SpanPipelineError> for NetspanError {
    fn from(err: SpanPipelineError) -> Self {
        match err {
            SpanPipelineError::NoInterface(_)
            | SpanPipelineError::SensorConfig { .. }
            | SpanPipelineError::SensorLaunch(_) => {
                NetspanError::Pipeline(PipelineError::SensorLaunch(err.to_string()))
            }
            SpanPipelineError::Backend(reason) => {
                NetspanError::Pipeline(PipelineError::BackendInit(reason))
            }
            SpanPipelineError::AlreadyStarted => {
                NetspanError::Pipeline(PipelineError::AlreadyStarted)
            }
            SpanPipelineError::Io(e) => NetspanError::Io(e),
            other => NetspanError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_config_error_display() {
        let err = SpanPipelineError::SensorConfig {
            path: "/etc/netspan/suricata.yaml".to_owned(),
            reason: "permission denied".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("suricata.yaml"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn sensor_errors_convert_to_sensor_launch() {
        let err: NetspanError = SpanPipelineError::NoInterface("none up".to_owned()).into();
        assert!(matches!(
            err,
            NetspanError::Pipeline(PipelineError::SensorLaunch(_))
        ));
    }

    #[test]
    fn backend_error_converts_to_backend_init() {
        let err: NetspanError = SpanPipelineError::Backend("bad endpoint".to_owned()).into();
        assert!(matches!(
            err,
            NetspanError::Pipeline(PipelineError::BackendInit(ref r)) if r == "bad endpoint"
        ));
    }

    #[test]
    fn io_error_stays_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: NetspanError = SpanPipelineError::Io(io).into();
        assert!(matches!(err, NetspanError::Io(_)));
    }
}
