//! Signed-in user and their friends list.
//!
//! The store composes two independently scoped caches: the user record and
//! the friends list. Each has its own staleness window and subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use circle_core::{
    scope_label, AccountId, CircleResult, LimitedUserFriend, ResourceKind, ScopeId, StoreError,
    User, UserStatus,
};
use tracing::{debug, info};

use super::{edit_by_id, remove_by_id, upsert_by_id};
use crate::backend::{require_account, Backend};
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::freshness::EntryState;
use crate::observer::Subscription;
use crate::resource::ResourceLoader;
use crate::scope::AccountScope;
use crate::store::{EnsureOptions, ResourceStore, ScopeDebugRecord, SetOptions};

struct CurrentUserLoader {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl ResourceLoader<User> for CurrentUserLoader {
    async fn load(&self, scope: &ScopeId) -> CircleResult<User> {
        // With no active account this looks up whichever session exists.
        self.backend.current_user(scope.as_ref()).await
    }
}

struct FriendsLoader {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl ResourceLoader<Vec<LimitedUserFriend>> for FriendsLoader {
    async fn load(&self, scope: &ScopeId) -> CircleResult<Vec<LimitedUserFriend>> {
        let account = require_account(scope, ResourceKind::Friends)?;
        self.backend.friends(account).await
    }
}

#[derive(Clone)]
pub struct UserStore {
    backend: Arc<dyn Backend>,
    scope: Arc<AccountScope>,
    user: ResourceStore<User>,
    friends: ResourceStore<Vec<LimitedUserFriend>>,
}

delegate_resource_store!(UserStore, user, User);

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("user", &self.user)
            .field("friends", &self.friends)
            .finish_non_exhaustive()
    }
}

impl UserStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        scope: Arc<AccountScope>,
        clock: Arc<dyn Clock>,
        user_config: StoreConfig,
        friends_config: StoreConfig,
    ) -> Self {
        let user = ResourceStore::new(
            ResourceKind::CurrentUser,
            user_config,
            Arc::new(CurrentUserLoader {
                backend: Arc::clone(&backend),
            }),
            Arc::clone(&scope),
            Arc::clone(&clock),
        );
        let friends = ResourceStore::new(
            ResourceKind::Friends,
            friends_config,
            Arc::new(FriendsLoader {
                backend: Arc::clone(&backend),
            }),
            Arc::clone(&scope),
            clock,
        );
        Self {
            backend,
            scope,
            user,
            friends,
        }
    }

    /// Id of the cached user for the active account.
    pub fn user_id(&self) -> Option<AccountId> {
        self.user.snapshot(None).map(|user| user.id)
    }

    /// Cache a freshly authenticated user under their own account and make
    /// that account active.
    pub fn adopt_session(&self, user: User) {
        let account = Some(user.id.clone());
        info!(account = %scope_label(&account), "Adopting session");
        self.user
            .set(Some(user), SetOptions::new().for_scope(account.clone()));
        self.scope.set_active(account);
    }

    /// Change the active account's presence status through the backend and
    /// cache the returned user.
    pub async fn update_status(
        &self,
        status: UserStatus,
        description: impl Into<String>,
    ) -> CircleResult<User> {
        let scope = self.scope.active();
        let account = scope.clone().ok_or(StoreError::NoActiveAccount {
            resource: ResourceKind::CurrentUser,
        })?;
        let description = description.into();

        let user = self
            .backend
            .update_status(&account, status, &description)
            .await?;
        debug!(account = %account, status = %status, "Status updated");
        self.user
            .set(Some(user.clone()), SetOptions::new().for_scope(scope));
        Ok(user)
    }

    /// The friends cache.
    pub fn friends_store(&self) -> &ResourceStore<Vec<LimitedUserFriend>> {
        &self.friends
    }

    pub fn friends_snapshot(&self, scope: Option<&ScopeId>) -> Option<Vec<LimitedUserFriend>> {
        self.friends.snapshot(scope)
    }

    pub fn subscribe_friends<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Option<Vec<LimitedUserFriend>>) + Send + Sync + 'static,
    {
        self.friends.subscribe(listener)
    }

    pub async fn ensure_friends(&self) -> CircleResult<Vec<LimitedUserFriend>> {
        self.friends.ensure(EnsureOptions::new()).await
    }

    pub async fn ensure_friends_with(
        &self,
        options: EnsureOptions,
    ) -> CircleResult<Vec<LimitedUserFriend>> {
        self.friends.ensure(options).await
    }

    pub async fn refresh_friends(&self) -> CircleResult<Vec<LimitedUserFriend>> {
        self.friends.refresh().await
    }

    pub fn set_friends(&self, friends: Option<Vec<LimitedUserFriend>>, options: SetOptions) {
        self.friends.set(friends, options)
    }

    pub fn clear_friends(&self, scope: Option<&ScopeId>) {
        self.friends.clear(scope)
    }

    pub fn mark_friends_stale(&self, scope: Option<&ScopeId>) {
        self.friends.mark_stale(scope)
    }

    pub fn friends_state(&self, scope: Option<&ScopeId>) -> EntryState {
        self.friends.state(scope)
    }

    pub fn friends_debug_records(&self) -> Vec<ScopeDebugRecord> {
        self.friends.debug_records()
    }

    /// Insert or replace a friend in the active account's list.
    ///
    /// The signed-in user never appears in their own friends list, so an
    /// upsert for the active account id is ignored.
    pub fn upsert_friend(&self, friend: LimitedUserFriend) -> bool {
        if self
            .scope
            .active()
            .is_some_and(|active| active.as_str() == friend.id)
        {
            debug!(friend_id = %friend.id, "Skipping upsert of current user into friends");
            return false;
        }
        self.friends.update(None, |friends| {
            upsert_by_id(friends, friend);
            true
        })
    }

    pub fn remove_friend(&self, friend_id: &str) -> bool {
        let removed = self
            .friends
            .update(None, |friends| remove_by_id(friends, friend_id));
        if removed {
            info!(friend_id, "Removed friend");
        }
        removed
    }

    /// Mark a friend as signed out: location becomes `"offline"` and the
    /// platform is cleared.
    pub fn set_friend_offline(&self, friend_id: &str) -> bool {
        self.friends.update(None, |friends| {
            edit_by_id(friends, friend_id, |friend| {
                friend.location = Some(LimitedUserFriend::OFFLINE_LOCATION.to_string());
                friend.platform.clear();
            })
        })
    }

    pub fn update_friend_location(
        &self,
        friend_id: &str,
        location: impl Into<String>,
        platform: Option<String>,
    ) -> bool {
        let location = location.into();
        self.friends.update(None, |friends| {
            edit_by_id(friends, friend_id, |friend| {
                friend.location = Some(location);
                if let Some(platform) = platform {
                    friend.platform = platform;
                }
            })
        })
    }

    /// Friends of the active account that are currently online.
    pub fn online_friends(&self) -> Vec<LimitedUserFriend> {
        self.friends
            .snapshot(None)
            .unwrap_or_default()
            .into_iter()
            .filter(LimitedUserFriend::is_online)
            .collect()
    }
}
