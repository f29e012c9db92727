//! Platform service status types
//!
//! Shape of the public status page summary (`/api/v2/status.json`).

use serde::{Deserialize, Serialize};

/// Severity indicator reported by the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusIndicator {
    /// All systems operational
    None,
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPage {
    pub id: String,
    pub name: String,
    pub url: String,
    pub time_zone: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub indicator: StatusIndicator,
    /// Human-readable status description
    pub description: String,
}

impl SystemStatus {
    /// Check if the platform is operating normally.
    pub fn is_healthy(&self) -> bool {
        matches!(self.indicator, StatusIndicator::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub page: StatusPage,
    pub status: SystemStatus,
}
