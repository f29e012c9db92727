//! Per-store cache configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use circle_core::ResourceKind;

/// How a store partitions its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scoping {
    /// One partition per account; follows the active [`AccountScope`](crate::AccountScope).
    Account,
    /// A single partition shared by every account.
    Global,
}

/// Configuration for one resource store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long a fetched value stays fresh.
    pub staleness: Duration,
    /// Upper bound for a single load. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
    pub scoping: Scoping,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(5 * 60),
            fetch_timeout: None,
            scoping: Scoping::Account,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a specific resource.
    pub fn for_kind(kind: ResourceKind) -> Self {
        let (staleness, scoping) = match kind {
            ResourceKind::CurrentUser => (Duration::from_secs(5 * 60), Scoping::Account),
            ResourceKind::Friends => (Duration::from_secs(60), Scoping::Account),
            ResourceKind::Worlds => (Duration::from_secs(5 * 60), Scoping::Account),
            ResourceKind::Avatars => (Duration::from_secs(5 * 60), Scoping::Account),
            ResourceKind::Accounts => (Duration::from_secs(10 * 60), Scoping::Global),
            ResourceKind::DeveloperMode => (Duration::from_secs(10 * 60), Scoping::Global),
            ResourceKind::Status => (Duration::from_secs(60), Scoping::Global),
        };
        Self {
            staleness,
            fetch_timeout: None,
            scoping,
        }
    }

    /// Set the staleness window.
    pub fn with_staleness(mut self, window: Duration) -> Self {
        self.staleness = window;
        self
    }

    /// Bound every load by `timeout`.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn with_scoping(mut self, scoping: Scoping) -> Self {
        self.scoping = scoping;
        self
    }
}

/// Configuration for every store an [`AppContext`](crate::AppContext) builds.
///
/// Kinds without an explicit entry use [`StoreConfig::for_kind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfigs {
    overrides: BTreeMap<ResourceKind, StoreConfig>,
}

impl StoreConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ResourceKind, config: StoreConfig) -> Self {
        self.overrides.insert(kind, config);
        self
    }

    /// Override only the staleness window of `kind`.
    pub fn with_staleness(self, kind: ResourceKind, window: Duration) -> Self {
        let config = self.get(kind).with_staleness(window);
        self.with(kind, config)
    }

    /// Apply the same fetch timeout to every store.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        for kind in ResourceKind::ALL {
            let config = self.get(kind).with_fetch_timeout(timeout);
            self.overrides.insert(kind, config);
        }
        self
    }

    pub fn get(&self, kind: ResourceKind) -> StoreConfig {
        self.overrides
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| StoreConfig::for_kind(kind))
    }
}
