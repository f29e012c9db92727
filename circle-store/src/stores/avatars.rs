//! Avatars uploaded by the active account, newest first.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{CircleResult, LimitedAvatar, ResourceKind, ScopeId};

use super::{remove_by_id, upsert_by_id};
use crate::backend::{require_account, Backend};
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::resource::ResourceLoader;
use crate::scope::AccountScope;
use crate::store::ResourceStore;

struct AvatarsLoader {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl ResourceLoader<Vec<LimitedAvatar>> for AvatarsLoader {
    async fn load(&self, scope: &ScopeId) -> CircleResult<Vec<LimitedAvatar>> {
        let account = require_account(scope, ResourceKind::Avatars)?;
        self.backend.uploaded_avatars(account).await
    }
}

#[derive(Debug, Clone)]
pub struct AvatarsStore {
    store: ResourceStore<Vec<LimitedAvatar>>,
}

delegate_resource_store!(AvatarsStore, store, Vec<LimitedAvatar>);

impl AvatarsStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        scope: Arc<AccountScope>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        let loader = Arc::new(AvatarsLoader { backend });
        Self {
            store: ResourceStore::new(ResourceKind::Avatars, config, loader, scope, clock),
        }
    }

    pub fn upsert_avatar(&self, avatar: LimitedAvatar) -> bool {
        self.store.update(None, |avatars| {
            upsert_by_id(avatars, avatar);
            true
        })
    }

    pub fn remove_avatar(&self, avatar_id: &str) -> bool {
        self.store
            .update(None, |avatars| remove_by_id(avatars, avatar_id))
    }
}
