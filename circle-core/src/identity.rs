//! Identity types for Circle resources and cache partitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier used for locally generated records (alerts, log entries).
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds, as reported to inspector tooling.
pub type DurationMs = i64;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Identifier of a signed-in platform account (`usr_...` on the remote API).
///
/// Accounts are the tenants of the client cache: every scoped store keeps
/// one partition per account it has ever seen.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Cache partition key. `None` is the "no active account" partition.
pub type ScopeId = Option<AccountId>;

/// Label used for the `None` partition in logs and inspector output.
pub const NO_ACCOUNT_LABEL: &str = "<none>";

/// Human-readable label for a scope, used as a tracing field and by the
/// inspector's lexicographic ordering.
pub fn scope_label(scope: &ScopeId) -> &str {
    match scope {
        Some(id) => id.as_str(),
        None => NO_ACCOUNT_LABEL,
    }
}
