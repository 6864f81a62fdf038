//! Logging setup for netspan-daemon.
//!
//! Logging comes up in two steps. Loading the settings file can already warn
//! (clamped worker counts, unparseable `NETSPAN_*` values), so [`bootstrap`]
//! provides a default-format subscriber scoped to that load. Once the final
//! [`GeneralConfig`] is known, [`init_tracing`] installs the global one.
//! `RUST_LOG`, when set, replaces the configured level in both.

use anyhow::{Result, bail};
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use netspan_core::config::GeneralConfig;

/// A boxed subscriber, ready to be installed or scoped to a future.
pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync + 'static>;

/// Builds the subscriber described by `config`, writing to `writer`.
///
/// * `"json"` - one JSON object per line
/// * `"pretty"` - human-readable multi-line output
pub fn subscriber<W>(config: &GeneralConfig, writer: W) -> Result<BoxedSubscriber>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    Ok(match config.log_format.as_str() {
        "json" => Box::new(registry.with(tracing_subscriber::fmt::layer().json().with_writer(writer))),
        "pretty" => Box::new(
            registry.with(tracing_subscriber::fmt::layer().pretty().with_writer(writer)),
        ),
        other => bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    })
}

/// Subscriber for the config load, before the configured format is known.
pub fn bootstrap() -> Result<BoxedSubscriber> {
    subscriber(&GeneralConfig::default(), std::io::stdout)
}

/// Installs the global subscriber. Call once, after the config is final.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    subscriber(config, std::io::stdout)?
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_is_rejected() {
        let config = GeneralConfig {
            log_level: "info".to_owned(),
            log_format: "xml".to_owned(),
        };
        let err = subscriber(&config, std::io::sink).err().unwrap();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn both_formats_build() {
        for format in ["json", "pretty"] {
            let config = GeneralConfig {
                log_level: "debug".to_owned(),
                log_format: format.to_owned(),
            };
            assert!(subscriber(&config, std::io::sink).is_ok(), "{format}");
        }
    }
}
