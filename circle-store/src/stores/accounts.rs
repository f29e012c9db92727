//! Accounts remembered on this device.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{AccountId, CircleResult, ResourceKind, ScopeId, StoredAccount};
use tracing::info;

use super::remove_by_id;
use crate::backend::Backend;
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::resource::ResourceLoader;
use crate::scope::AccountScope;
use crate::store::ResourceStore;

struct AccountsLoader {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl ResourceLoader<Vec<StoredAccount>> for AccountsLoader {
    async fn load(&self, _scope: &ScopeId) -> CircleResult<Vec<StoredAccount>> {
        self.backend.accounts().await
    }
}

/// Global list of stored accounts, plus account switching.
#[derive(Clone)]
pub struct AccountsStore {
    backend: Arc<dyn Backend>,
    scope: Arc<AccountScope>,
    store: ResourceStore<Vec<StoredAccount>>,
}

delegate_resource_store!(AccountsStore, store, Vec<StoredAccount>);

impl std::fmt::Debug for AccountsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountsStore")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AccountsStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        scope: Arc<AccountScope>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        let loader = Arc::new(AccountsLoader {
            backend: Arc::clone(&backend),
        });
        let store = ResourceStore::new(
            ResourceKind::Accounts,
            config,
            loader,
            Arc::clone(&scope),
            clock,
        );
        Self {
            backend,
            scope,
            store,
        }
    }

    /// Make `account` the active account.
    ///
    /// The cached list is updated optimistically so exactly that account is
    /// flagged `last_active`. Every account-scoped store re-emits the new
    /// partition. Returns whether the active account changed.
    pub fn switch_account(&self, account: AccountId) -> bool {
        self.store.update(None, |accounts| {
            let mut changed = false;
            for stored in accounts.iter_mut() {
                let active = stored.user_id == account;
                changed |= stored.last_active != active;
                stored.last_active = active;
            }
            changed
        });
        self.scope.set_active(Some(account))
    }

    /// Forget an account on the backend, then drop it locally.
    ///
    /// Removing the active account leaves no account active. On backend
    /// failure nothing changes locally.
    pub async fn remove_account(&self, account: &AccountId) -> CircleResult<()> {
        self.backend.remove_account(account).await?;
        self.store
            .update(None, |accounts| remove_by_id(accounts, account.as_str()));
        info!(account = %account, "Removed stored account");

        if self.scope.active().as_ref() == Some(account) {
            self.scope.set_active(None);
        }
        Ok(())
    }

    /// The account flagged as last used, if any.
    pub fn last_active(&self) -> Option<StoredAccount> {
        self.store
            .snapshot(None)?
            .into_iter()
            .find(|account| account.last_active)
    }
}
