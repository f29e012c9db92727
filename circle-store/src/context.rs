//! Application context owning every store.
//!
//! One `AppContext` replaces process-wide globals: it owns the registry,
//! the account scope, the alert store and each specialized store, all
//! wired to the same backend and clock.

use std::sync::Arc;

use circle_core::{CircleResult, ResourceKind, ScopeId};
use tracing::info;

use crate::alerts::AlertStore;
use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfigs;
use crate::inspector::StoreInspector;
use crate::registry::{keys, SingletonRegistry};
use crate::scope::AccountScope;
use crate::stores::{
    AccountsStore, AvatarsStore, DeveloperModeStore, StatusStore, UserStore, WorldsStore,
};

/// Builder for [`AppContext`].
pub struct AppContextBuilder {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    configs: StoreConfigs,
    active_account: ScopeId,
}

impl AppContextBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn configs(mut self, configs: StoreConfigs) -> Self {
        self.configs = configs;
        self
    }

    pub fn active_account(mut self, account: ScopeId) -> Self {
        self.active_account = account;
        self
    }

    pub fn build(self) -> CircleResult<AppContext> {
        AppContext::from_builder(self)
    }
}

pub struct AppContext {
    registry: SingletonRegistry,
    scope: Arc<AccountScope>,
    alerts: Arc<AlertStore>,
    user: Arc<UserStore>,
    worlds: Arc<WorldsStore>,
    avatars: Arc<AvatarsStore>,
    accounts: Arc<AccountsStore>,
    developer_mode: Arc<DeveloperModeStore>,
    status: Arc<StatusStore>,
    inspector: Arc<StoreInspector>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("registry", &self.registry)
            .field("active_account", &self.scope.active())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn builder(backend: Arc<dyn Backend>) -> AppContextBuilder {
        AppContextBuilder {
            backend,
            clock: Arc::new(SystemClock),
            configs: StoreConfigs::default(),
            active_account: None,
        }
    }

    /// Context with the system clock and default store configuration.
    pub fn new(backend: Arc<dyn Backend>) -> CircleResult<Self> {
        Self::builder(backend).build()
    }

    fn from_builder(builder: AppContextBuilder) -> CircleResult<Self> {
        let AppContextBuilder {
            backend,
            clock,
            configs,
            active_account,
        } = builder;
        let registry = SingletonRegistry::new();

        let scope: Arc<AccountScope> = registry.register_singleton(keys::ACCOUNT_SCOPE, || {
            AccountScope::with_active(active_account)
        })?;
        let alerts: Arc<AlertStore> =
            registry.register_singleton(keys::ALERTS, || AlertStore::new(Arc::clone(&clock)))?;

        let user: Arc<UserStore> = registry.register_singleton(keys::USER, || {
            UserStore::new(
                Arc::clone(&backend),
                Arc::clone(&scope),
                Arc::clone(&clock),
                configs.get(ResourceKind::CurrentUser),
                configs.get(ResourceKind::Friends),
            )
        })?;
        let worlds: Arc<WorldsStore> = registry.register_singleton(keys::WORLDS, || {
            WorldsStore::new(
                Arc::clone(&backend),
                Arc::clone(&scope),
                Arc::clone(&clock),
                configs.get(ResourceKind::Worlds),
            )
        })?;
        let avatars: Arc<AvatarsStore> = registry.register_singleton(keys::AVATARS, || {
            AvatarsStore::new(
                Arc::clone(&backend),
                Arc::clone(&scope),
                Arc::clone(&clock),
                configs.get(ResourceKind::Avatars),
            )
        })?;
        let accounts: Arc<AccountsStore> = registry.register_singleton(keys::ACCOUNTS, || {
            AccountsStore::new(
                Arc::clone(&backend),
                Arc::clone(&scope),
                Arc::clone(&clock),
                configs.get(ResourceKind::Accounts),
            )
        })?;
        let developer_mode: Arc<DeveloperModeStore> =
            registry.register_singleton(keys::DEVELOPER_MODE, || {
                DeveloperModeStore::new(
                    Arc::clone(&backend),
                    Arc::clone(&scope),
                    Arc::clone(&clock),
                    configs.get(ResourceKind::DeveloperMode),
                )
            })?;
        let status: Arc<StatusStore> = registry.register_singleton(keys::STATUS, || {
            StatusStore::new(
                Arc::clone(&backend),
                Arc::clone(&scope),
                Arc::clone(&clock),
                configs.get(ResourceKind::Status),
                Arc::clone(&alerts),
            )
        })?;

        let inspector = StoreInspector::new()
            .with_store(Arc::new(user.resource_store().clone()))
            .with_store(Arc::new(user.friends_store().clone()))
            .with_store(Arc::new(worlds.resource_store().clone()))
            .with_store(Arc::new(avatars.resource_store().clone()))
            .with_store(Arc::new(accounts.resource_store().clone()))
            .with_store(Arc::new(developer_mode.resource_store().clone()))
            .with_store(Arc::new(status.resource_store().clone()));

        info!(keys = ?registry.keys(), "Application context ready");

        Ok(Self {
            registry,
            scope,
            alerts,
            user,
            worlds,
            avatars,
            accounts,
            developer_mode,
            status,
            inspector: Arc::new(inspector),
        })
    }

    pub fn registry(&self) -> &SingletonRegistry {
        &self.registry
    }

    pub fn scope(&self) -> Arc<AccountScope> {
        Arc::clone(&self.scope)
    }

    pub fn alerts(&self) -> Arc<AlertStore> {
        Arc::clone(&self.alerts)
    }

    pub fn user(&self) -> Arc<UserStore> {
        Arc::clone(&self.user)
    }

    pub fn worlds(&self) -> Arc<WorldsStore> {
        Arc::clone(&self.worlds)
    }

    pub fn avatars(&self) -> Arc<AvatarsStore> {
        Arc::clone(&self.avatars)
    }

    pub fn accounts(&self) -> Arc<AccountsStore> {
        Arc::clone(&self.accounts)
    }

    pub fn developer_mode(&self) -> Arc<DeveloperModeStore> {
        Arc::clone(&self.developer_mode)
    }

    pub fn status(&self) -> Arc<StatusStore> {
        Arc::clone(&self.status)
    }

    pub fn inspector(&self) -> Arc<StoreInspector> {
        Arc::clone(&self.inspector)
    }
}
