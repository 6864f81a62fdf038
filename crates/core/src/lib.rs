#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod record;

// --- re-exports ---

// errors
pub use error::{ConfigError, NetspanError, PipelineError};

// configuration
pub use config::{
    GeneralConfig, MetricsConfig, MissingFieldPolicy, NetspanConfig, OtelConfig, PipelineTuning,
    SensorSettings,
};

// events
pub use event::{FlowMetadata, HeaderKey, Headers, HttpEvent, HttpMessage};

// span attribute records
pub use record::{AttributeRecord, AttributeValue, Scheme};
