//! Logging initialization.
//!
//! `RUST_LOG` overrides the default filter. Output goes to stderr so that
//! `--dump` output on stdout stays machine-readable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogConfig;
use crate::error::MonitorError;
use crate::log_buffer::LogBuffer;

pub const DEFAULT_FILTER: &str = "circle_monitor=info,circle_store=info,warn";

/// Install the global subscriber and return the buffer it feeds.
pub fn init(config: &LogConfig) -> Result<LogBuffer, MonitorError> {
    let buffer = LogBuffer::new(config.buffer_capacity);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(buffer.layer())
        .try_init()
        .map_err(|e| MonitorError::Telemetry(e.to_string()))?;

    tracing::info!(
        json = config.json,
        buffer_capacity = buffer.capacity(),
        "Logging initialized"
    );
    Ok(buffer)
}
