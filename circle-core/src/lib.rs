//! Circle Core - Data Types
//!
//! Pure data structures shared by the cache layer and its collaborators:
//! identities and cache scopes, remote resource shapes, the error taxonomy,
//! and the inspector's structural value type. No caching logic lives here.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod debug_value;
pub mod entities;
pub mod error;
pub mod identity;
pub mod status;

pub use debug_value::DebugValue;
pub use entities::{
    DeveloperType, LimitedAvatar, LimitedUserFriend, LimitedWorld, ReleaseStatus,
    StoredAccount, User, UserStatus,
};
pub use error::{BackendError, CircleError, CircleResult, ConfigError, StoreError};
pub use identity::{
    new_entity_id, scope_label, AccountId, DurationMs, EntityId, ScopeId, Timestamp,
    NO_ACCOUNT_LABEL,
};
pub use status::{StatusIndicator, StatusPage, StatusResponse, SystemStatus};

/// Resource discriminator for cached payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    CurrentUser,
    Friends,
    Worlds,
    Avatars,
    Accounts,
    DeveloperMode,
    Status,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::CurrentUser,
        ResourceKind::Friends,
        ResourceKind::Worlds,
        ResourceKind::Avatars,
        ResourceKind::Accounts,
        ResourceKind::DeveloperMode,
        ResourceKind::Status,
    ];

    /// Stable name used as registry key, tracing field and inspector label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::CurrentUser => "current_user",
            ResourceKind::Friends => "friends",
            ResourceKind::Worlds => "worlds",
            ResourceKind::Avatars => "avatars",
            ResourceKind::Accounts => "accounts",
            ResourceKind::DeveloperMode => "developer_mode",
            ResourceKind::Status => "status",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
