//! Configuration -- the sensor settings file and runtime tuning.
//!
//! [`NetspanConfig`] is assembled once at startup and is read-only for the
//! lifetime of the process.
//!
//! # Sources
//! 1. CLI arguments (log level/format only, applied by the daemon)
//! 2. Environment variables (`NETSPAN_{SECTION}_{FIELD}`, e.g. `NETSPAN_PIPELINE_WORKERS=8`)
//! 3. The JSON settings file (`mirror-settings.json`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), netspan_core::error::NetspanError> {
//! use netspan_core::config::NetspanConfig;
//!
//! // settings file + env overrides + validation
//! let config = NetspanConfig::load("mirror-settings.json").await?;
//! println!("{} workers", config.pipeline.workers);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, NetspanError};

/// Lower bound for the per-stage worker count.
pub const MIN_WORKERS: usize = 1;
/// Upper bound for the per-stage worker count.
pub const MAX_WORKERS: usize = 50;

/// Placeholder in the sensor config template replaced with the interface name.
pub const INTERFACE_TEMPLATE_VAR: &str = "${NETWORK_INTERFACE}";
/// Placeholder in `sensor-command` replaced with the rendered config path.
pub const COMMAND_CONFIG_PLACEHOLDER: &str = "{config}";
/// Placeholder in `sensor-command` replaced with the interface name.
pub const COMMAND_INTERFACE_PLACEHOLDER: &str = "{interface}";

/// Complete netspan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetspanConfig {
    /// Settings file contents
    pub sensor: SensorSettings,
    /// Logging
    #[serde(default)]
    pub general: GeneralConfig,
    /// Worker pools, policy limits and shutdown timing
    #[serde(default)]
    pub pipeline: PipelineTuning,
    /// OTLP backend knobs
    #[serde(default)]
    pub otel: OtelConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl NetspanConfig {
    /// Loads the settings file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NetspanError> {
        let settings = SensorSettings::from_file(path).await?;
        let mut config = Self::from_settings(settings);
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Wraps already-parsed settings with default tuning.
    pub fn from_settings(sensor: SensorSettings) -> Self {
        Self {
            sensor,
            ..Self::default()
        }
    }

    /// Applies `NETSPAN_*` environment overrides.
    ///
    /// Values that fail to parse are logged and ignored. The worker count is
    /// clamped to `[MIN_WORKERS, MAX_WORKERS]` afterwards.
    pub fn apply_env_overrides(&mut self) {
        // Sensor
        override_string(
            &mut self.sensor.network_interface,
            "NETSPAN_SENSOR_NETWORK_INTERFACE",
        );
        override_string(&mut self.sensor.sensor_id, "NETSPAN_SENSOR_ID");
        override_string(
            &mut self.sensor.otel_collector_endpoint,
            "NETSPAN_SENSOR_OTEL_COLLECTOR_ENDPOINT",
        );
        override_csv(&mut self.sensor.accept_hosts, "NETSPAN_SENSOR_ACCEPT_HOSTS");
        override_csv(
            &mut self.sensor.deny_content_types,
            "NETSPAN_SENSOR_DENY_CONTENT_TYPE",
        );
        override_string(&mut self.pipeline.sensor_version, "NETSPAN_SENSOR_VERSION");

        // General
        override_string(&mut self.general.log_level, "NETSPAN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "NETSPAN_GENERAL_LOG_FORMAT");

        // Pipeline
        override_workers(&mut self.pipeline.workers, "NETSPAN_PIPELINE_WORKERS");
        override_parsed(
            &mut self.pipeline.max_body_size,
            "NETSPAN_PIPELINE_MAX_BODY_SIZE",
        );
        override_parsed(
            &mut self.pipeline.max_line_length,
            "NETSPAN_PIPELINE_MAX_LINE_LENGTH",
        );
        override_parsed(
            &mut self.pipeline.grace_period_secs,
            "NETSPAN_PIPELINE_GRACE_PERIOD_SECS",
        );
        override_parsed(
            &mut self.pipeline.missing_fields,
            "NETSPAN_PIPELINE_MISSING_FIELDS",
        );

        // OTLP
        override_parsed(
            &mut self.otel.export_timeout_secs,
            "NETSPAN_OTEL_EXPORT_TIMEOUT_SECS",
        );
        override_parsed(
            &mut self.otel.batch_timeout_secs,
            "NETSPAN_OTEL_BATCH_TIMEOUT_SECS",
        );
        override_parsed(&mut self.otel.max_batch_size, "NETSPAN_OTEL_MAX_BATCH_SIZE");
        override_parsed(&mut self.otel.max_queue_size, "NETSPAN_OTEL_MAX_QUEUE_SIZE");
        override_parsed(
            &mut self.otel.retry_initial_interval_ms,
            "NETSPAN_OTEL_RETRY_INITIAL_INTERVAL_MS",
        );
        override_parsed(
            &mut self.otel.retry_max_interval_ms,
            "NETSPAN_OTEL_RETRY_MAX_INTERVAL_MS",
        );
        override_parsed(
            &mut self.otel.retry_max_elapsed_secs,
            "NETSPAN_OTEL_RETRY_MAX_ELAPSED_SECS",
        );

        // Metrics
        override_parsed(&mut self.metrics.enabled, "NETSPAN_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "NETSPAN_METRICS_LISTEN_ADDR");
        override_parsed(&mut self.metrics.port, "NETSPAN_METRICS_PORT");

        self.pipeline.clamp_workers();
    }

    /// Validates every section. Any error here aborts startup.
    pub fn validate(&self) -> Result<(), NetspanError> {
        self.sensor.validate()?;
        self.pipeline.validate()?;
        self.otel.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when enabled"));
        }

        Ok(())
    }
}

/// Contents of the JSON settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SensorSettings {
    /// Capture interface; empty selects the first up, non-loopback interface
    pub network_interface: String,
    /// Sensor identity copied onto every span; must be a UUID
    pub sensor_id: String,
    /// OTLP/gRPC collector endpoint (`host:port` or a URL)
    pub otel_collector_endpoint: String,
    /// Hosts whose traffic is exported
    pub accept_hosts: Vec<String>,
    /// Content-Type substrings that cause a transaction to be dropped
    #[serde(rename = "deny-content-type")]
    pub deny_content_types: Vec<String>,
    /// Sensor YAML template containing `${NETWORK_INTERFACE}`
    pub sensor_config_template: PathBuf,
    /// Where the rendered sensor config is written before launch
    pub sensor_config_path: PathBuf,
    /// Sensor argv; `{config}` and `{interface}` are substituted
    pub sensor_command: Vec<String>,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            network_interface: String::new(),
            sensor_id: String::new(),
            otel_collector_endpoint: "localhost:4317".to_owned(),
            accept_hosts: Vec::new(),
            deny_content_types: Vec::new(),
            sensor_config_template: PathBuf::from("/etc/netspan/suricata.yaml"),
            sensor_config_path: PathBuf::from("/tmp/netspan-suricata.yaml"),
            sensor_command: [
                "stdbuf",
                "-oL",
                "suricata",
                "-c",
                COMMAND_CONFIG_PLACEHOLDER,
                "-i",
                COMMAND_INTERFACE_PLACEHOLDER,
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
        }
    }
}

impl SensorSettings {
    /// Reads and parses the settings file (no validation).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, NetspanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NetspanError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                NetspanError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses settings from a JSON string.
    pub fn parse(json: &str) -> Result<Self, NetspanError> {
        serde_json::from_str(json).map_err(|e| {
            NetspanError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Collector endpoint as a URL the gRPC exporter accepts.
    ///
    /// `collector:4317` becomes `http://collector:4317`.
    pub fn collector_endpoint(&self) -> String {
        let endpoint = self.otel_collector_endpoint.trim();
        if endpoint.contains("://") {
            endpoint.to_owned()
        } else {
            format!("http://{endpoint}")
        }
    }

    /// Parsed sensor id. Only meaningful after [`validate`](Self::validate).
    pub fn sensor_uuid(&self) -> Option<uuid::Uuid> {
        uuid::Uuid::parse_str(&self.sensor_id).ok()
    }

    fn validate(&self) -> Result<(), NetspanError> {
        if uuid::Uuid::parse_str(&self.sensor_id).is_err() {
            return Err(invalid(
                "sensor-id",
                format!("'{}' is not a valid UUID", self.sensor_id),
            ));
        }

        if self.otel_collector_endpoint.trim().is_empty() {
            return Err(invalid("otel-collector-endpoint", "must not be empty"));
        }

        if self.sensor_command.is_empty() || self.sensor_command[0].trim().is_empty() {
            return Err(invalid("sensor-command", "must name an executable"));
        }

        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json, pretty
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// What the filter stage does with an event whose required fields are missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Drop the event and log which fields were missing
    #[default]
    Reject,
    /// Export the event with empty strings / zero for the missing fields
    FillDefaults,
}

impl FromStr for MissingFieldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reject" => Ok(Self::Reject),
            "fill" | "fill_defaults" => Ok(Self::FillDefaults),
            other => Err(format!("unknown missing-field policy '{other}'")),
        }
    }
}

impl fmt::Display for MissingFieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::FillDefaults => f.write_str("fill"),
        }
    }
}

/// Pipeline sizing, filter limits and shutdown timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTuning {
    /// Workers per pool; also the capacity of both queues
    pub workers: usize,
    /// Largest request or response body accepted, in bytes
    pub max_body_size: usize,
    /// Longest sensor output line read, in bytes; longer lines are discarded
    pub max_line_length: usize,
    /// Time allowed for in-flight items after a shutdown signal
    pub grace_period_secs: u64,
    /// Strictness of required-field validation
    pub missing_fields: MissingFieldPolicy,
    /// Copied onto every span as `sensor.version`
    pub sensor_version: String,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            workers: 10,
            max_body_size: 1024 * 1024, // 1 MiB
            // both bodies plus headers and metadata
            max_line_length: 2 * 1024 * 1024 + 64 * 1024,
            grace_period_secs: 10,
            missing_fields: MissingFieldPolicy::Reject,
            sensor_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl PipelineTuning {
    /// Shutdown grace window.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Forces `workers` into `[MIN_WORKERS, MAX_WORKERS]`.
    pub fn clamp_workers(&mut self) {
        let clamped = self.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        if clamped != self.workers {
            warn!(
                requested = self.workers,
                clamped,
                "worker count out of range, clamping"
            );
            self.workers = clamped;
        }
    }

    fn validate(&self) -> Result<(), NetspanError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(invalid(
                "pipeline.workers",
                format!("must be {MIN_WORKERS}-{MAX_WORKERS}"),
            ));
        }
        if self.max_body_size == 0 {
            return Err(invalid("pipeline.max_body_size", "must be greater than 0"));
        }
        if self.max_line_length == 0 {
            return Err(invalid("pipeline.max_line_length", "must be greater than 0"));
        }
        Ok(())
    }
}

/// OTLP exporter, batching and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelConfig {
    /// Per-export deadline (seconds)
    pub export_timeout_secs: u64,
    /// Batch processor scheduled delay (seconds)
    pub batch_timeout_secs: u64,
    /// Spans per export request
    pub max_batch_size: usize,
    /// Spans buffered by the batch processor before new ones are dropped
    pub max_queue_size: usize,
    /// First retry backoff (milliseconds)
    pub retry_initial_interval_ms: u64,
    /// Backoff cap (milliseconds)
    pub retry_max_interval_ms: u64,
    /// Give up retrying a batch after this long (seconds)
    pub retry_max_elapsed_secs: u64,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            export_timeout_secs: 30,
            batch_timeout_secs: 5,
            max_batch_size: 512,
            max_queue_size: 2048,
            retry_initial_interval_ms: 1_000,
            retry_max_interval_ms: 5_000,
            retry_max_elapsed_secs: 30,
        }
    }
}

impl OtelConfig {
    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn retry_initial_interval(&self) -> Duration {
        Duration::from_millis(self.retry_initial_interval_ms)
    }

    pub fn retry_max_interval(&self) -> Duration {
        Duration::from_millis(self.retry_max_interval_ms)
    }

    pub fn retry_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.retry_max_elapsed_secs)
    }

    fn validate(&self) -> Result<(), NetspanError> {
        if self.export_timeout_secs == 0 {
            return Err(invalid("otel.export_timeout_secs", "must be greater than 0"));
        }
        if self.max_batch_size == 0 || self.max_queue_size == 0 {
            return Err(invalid(
                "otel.max_batch_size",
                "batch and queue sizes must be greater than 0",
            ));
        }
        if self.max_batch_size > self.max_queue_size {
            return Err(invalid(
                "otel.max_batch_size",
                format!(
                    "batch size {} exceeds queue size {}",
                    self.max_batch_size, self.max_queue_size
                ),
            ));
        }
        if self.retry_initial_interval_ms == 0
            || self.retry_initial_interval_ms > self.retry_max_interval_ms
        {
            return Err(invalid(
                "otel.retry_initial_interval_ms",
                "must be greater than 0 and not exceed retry_max_interval_ms",
            ));
        }
        Ok(())
    }
}

/// Prometheus endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> NetspanError {
    NetspanError::Config(ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    })
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T>(target: &mut T, env_key: &str)
where
    T: FromStr,
{
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}

/// Signed parse so that `0` and negative counts clamp to `MIN_WORKERS`
/// instead of being ignored.
fn override_workers(target: &mut usize, env_key: &str) {
    let Ok(val) = std::env::var(env_key) else {
        return;
    };
    match val.trim().parse::<i64>() {
        Ok(requested) => {
            let clamped = requested.clamp(MIN_WORKERS as i64, MAX_WORKERS as i64);
            if clamped != requested {
                warn!(env_key, requested, clamped, "worker count out of range, clamping");
            }
            *target = usize::try_from(clamped).unwrap_or(MIN_WORKERS);
        }
        Err(_) => warn!(
            env_key,
            value = val.as_str(),
            "failed to parse env var, ignoring"
        ),
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
