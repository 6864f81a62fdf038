//! Error types shared across the workspace.

/// Top-level netspan error.
#[derive(Debug, thiserror::Error)]
pub enum NetspanError {
    /// Configuration could not be loaded or failed validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline construction or lifecycle error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file not found
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Settings file is not valid JSON or has the wrong shape
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A value is out of range or malformed
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Pipeline lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The sensor could not be prepared or launched.
    #[error("sensor launch failed: {0}")]
    SensorLaunch(String),

    /// The telemetry backend could not be built.
    #[error("backend init failed: {0}")]
    BackendInit(String),

    /// Startup failed for another reason.
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// `run` called on a coordinator that already ran.
    #[error("pipeline already started")]
    AlreadyStarted,
}
