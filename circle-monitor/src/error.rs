//! Error types for the monitor binary.

use circle_core::CircleError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Circle(#[from] CircleError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
}
