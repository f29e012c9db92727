//! Error types for Circle operations
//!
//! Every error here is `Clone`: a single fetch outcome is shared by all the
//! callers that fanned in on it.

use crate::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the remote service collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} error: {message}")]
    Http { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit: {0}")]
    RateLimit(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl BackendError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// HTTP status code, if the failure came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("No active account for {resource:?}")]
    NoActiveAccount { resource: ResourceKind },

    #[error("Fetch of {resource:?} timed out after {timeout:?}")]
    FetchTimeout {
        resource: ResourceKind,
        timeout: Duration,
    },

    #[error("Fetch of {resource:?} was cancelled")]
    FetchCancelled { resource: ResourceKind },

    #[error("Cannot decode {resource:?} from debug value: {reason}")]
    Decode {
        resource: ResourceKind,
        reason: String,
    },

    #[error("Registry key {key} holds a different type")]
    RegistryTypeMismatch { key: String },

    #[error("Unknown store: {name}")]
    UnknownStore { name: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all Circle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CircleError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Circle operations.
pub type CircleResult<T> = Result<T, CircleError>;

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::parse(format!("JSON parsing failed: {}", err))
    }
}

// =============================================================================
// TESTS
// =============================================================================
