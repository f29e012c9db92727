//! Worlds uploaded by the active account.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{CircleResult, LimitedWorld, ResourceKind, ScopeId};
use tracing::debug;

use super::{remove_by_id, upsert_by_id};
use crate::backend::{require_account, Backend};
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::resource::ResourceLoader;
use crate::scope::AccountScope;
use crate::store::ResourceStore;

struct WorldsLoader {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl ResourceLoader<Vec<LimitedWorld>> for WorldsLoader {
    async fn load(&self, scope: &ScopeId) -> CircleResult<Vec<LimitedWorld>> {
        let account = require_account(scope, ResourceKind::Worlds)?;
        self.backend.uploaded_worlds(account).await
    }
}

#[derive(Debug, Clone)]
pub struct WorldsStore {
    store: ResourceStore<Vec<LimitedWorld>>,
}

delegate_resource_store!(WorldsStore, store, Vec<LimitedWorld>);

impl WorldsStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        scope: Arc<AccountScope>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        let loader = Arc::new(WorldsLoader { backend });
        Self {
            store: ResourceStore::new(ResourceKind::Worlds, config, loader, scope, clock),
        }
    }

    /// Insert or replace a world in the active account's listing.
    /// No-op when the listing has not been loaded.
    pub fn upsert_world(&self, world: LimitedWorld) -> bool {
        debug!(world_id = %world.id, "Upserting world");
        self.store.update(None, |worlds| {
            upsert_by_id(worlds, world);
            true
        })
    }

    pub fn remove_world(&self, world_id: &str) -> bool {
        self.store
            .update(None, |worlds| remove_by_id(worlds, world_id))
    }
}
