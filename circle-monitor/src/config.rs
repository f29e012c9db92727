//! Configuration loading for the Circle monitor.
//!
//! Connection and logging fields are required. Store tuning, accounts and
//! the session cookie are optional; omitted store settings fall back to the
//! per-resource defaults in `circle-store`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use circle_core::{AccountId, ResourceKind, ScopeId, StoredAccount};
use circle_store::StoreConfigs;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    pub api_base_url: String,
    pub status_url: String,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub auth_cookie: Option<String>,
    pub active_account: Option<String>,
    #[serde(default)]
    pub developer_mode: bool,
    pub fetch_timeout_ms: Option<u64>,
    /// Staleness window overrides in milliseconds, keyed by store name.
    #[serde(default)]
    pub staleness: BTreeMap<String, u64>,
    pub retry: RetryConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub initial_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub json: bool,
    pub buffer_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub last_login: String,
    pub avatar_url: Option<String>,
    /// Session cookie for this account.
    pub auth_cookie: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] circle_core::ConfigError),
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(circle_core::ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    })
}

/// Command line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    /// Poll status once and exit instead of polling until Ctrl-C.
    pub once: bool,
    /// Print the store inspector report and buffered logs on exit.
    pub dump: bool,
}

impl CliArgs {
    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = args.next().map(PathBuf::from),
                "--once" => parsed.once = true,
                "--dump" => parsed.dump = true,
                _ => {}
            }
        }
        parsed
    }
}

impl MonitorConfig {
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let path = args.config.clone().or_else(config_path_from_env);
        let path = path.ok_or_else(|| circle_core::ConfigError::MissingRequired {
            field: "--config or CIRCLE_MONITOR_CONFIG".to_string(),
        })?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: MonitorConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, url) in [
            ("api_base_url", &self.api_base_url),
            ("status_url", &self.status_url),
        ] {
            if url.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid(field, "must be an http(s) URL"));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be > 0"));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(invalid("fetch_timeout_ms", "must be > 0"));
        }
        for (name, window) in &self.staleness {
            let field = format!("staleness.{}", name);
            if ResourceKind::from_name(name).is_none() {
                return Err(invalid(field, "unknown store name"));
            }
            if *window == 0 {
                return Err(invalid(field, "must be > 0"));
            }
        }
        if self.retry.initial_ms == 0 {
            return Err(invalid("retry.initial_ms", "must be > 0"));
        }
        if self.retry.max_ms < self.retry.initial_ms {
            return Err(invalid("retry.max_ms", "must be >= retry.initial_ms"));
        }
        if self.log.buffer_capacity == 0 {
            return Err(invalid("log.buffer_capacity", "must be > 0"));
        }
        if self
            .auth_cookie
            .as_deref()
            .is_some_and(|cookie| cookie.trim().is_empty())
        {
            return Err(invalid("auth_cookie", "must not be empty when set"));
        }
        if self
            .active_account
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(invalid("active_account", "must not be empty when set"));
        }
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.user_id.trim().is_empty() {
                return Err(invalid("accounts.user_id", "must not be empty"));
            }
            if account
                .auth_cookie
                .as_deref()
                .is_some_and(|cookie| cookie.trim().is_empty())
            {
                return Err(invalid("accounts.auth_cookie", "must not be empty when set"));
            }
            if !seen.insert(account.user_id.as_str()) {
                return Err(invalid(
                    "accounts.user_id",
                    format!("duplicate account {}", account.user_id),
                ));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn active_scope(&self) -> ScopeId {
        self.active_account.as_deref().map(AccountId::from)
    }

    /// Per-store settings: defaults plus the configured overrides.
    pub fn store_configs(&self) -> StoreConfigs {
        let mut configs = StoreConfigs::new();
        for (name, ms) in &self.staleness {
            if let Some(kind) = ResourceKind::from_name(name) {
                configs = configs.with_staleness(kind, Duration::from_millis(*ms));
            }
        }
        match self.fetch_timeout_ms {
            Some(ms) => configs.with_fetch_timeout(Duration::from_millis(ms)),
            None => configs,
        }
    }

    /// Session cookie per account.
    ///
    /// The top-level `auth_cookie` belongs to `active_account` unless that
    /// account carries its own.
    pub fn session_cookies(&self) -> HashMap<AccountId, String> {
        let mut cookies: HashMap<AccountId, String> = self
            .accounts
            .iter()
            .filter_map(|account| {
                let cookie = account.auth_cookie.clone()?;
                Some((AccountId::from(account.user_id.as_str()), cookie))
            })
            .collect();
        if let (Some(active), Some(cookie)) = (&self.active_account, &self.auth_cookie) {
            cookies
                .entry(AccountId::from(active.as_str()))
                .or_insert_with(|| cookie.clone());
        }
        cookies
    }

    /// Configured accounts, flagging the active one.
    pub fn stored_accounts(&self) -> Vec<StoredAccount> {
        self.accounts
            .iter()
            .map(|account| StoredAccount {
                user_id: AccountId::from(account.user_id.as_str()),
                username: account.username.clone(),
                display_name: account.display_name.clone(),
                avatar_url: account.avatar_url.clone(),
                avatar_fallback_url: None,
                last_login: account.last_login.clone(),
                last_active: self.active_account.as_deref() == Some(account.user_id.as_str()),
            })
            .collect()
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("CIRCLE_MONITOR_CONFIG").ok().map(PathBuf::from)
}
