//! Developer mode toggle.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{CircleResult, ResourceKind, ScopeId};
use tracing::info;

use crate::backend::Backend;
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::resource::ResourceLoader;
use crate::scope::AccountScope;
use crate::store::{ResourceStore, SetOptions};

struct DeveloperModeLoader {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl ResourceLoader<bool> for DeveloperModeLoader {
    async fn load(&self, _scope: &ScopeId) -> CircleResult<bool> {
        self.backend.developer_mode().await
    }
}

#[derive(Clone)]
pub struct DeveloperModeStore {
    backend: Arc<dyn Backend>,
    store: ResourceStore<bool>,
}

delegate_resource_store!(DeveloperModeStore, store, bool);

impl std::fmt::Debug for DeveloperModeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeveloperModeStore")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl DeveloperModeStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        scope: Arc<AccountScope>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        let loader = Arc::new(DeveloperModeLoader {
            backend: Arc::clone(&backend),
        });
        Self {
            backend,
            store: ResourceStore::new(ResourceKind::DeveloperMode, config, loader, scope, clock),
        }
    }

    /// Persist the setting through the backend, then cache it.
    pub async fn set_enabled(&self, enabled: bool) -> CircleResult<()> {
        self.backend.set_developer_mode(enabled).await?;
        self.store.set(Some(enabled), SetOptions::new());
        info!(enabled, "Developer mode changed");
        Ok(())
    }

    /// Cached setting; `false` until loaded.
    pub fn is_enabled(&self) -> bool {
        self.store.snapshot(None).unwrap_or(false)
    }
}
