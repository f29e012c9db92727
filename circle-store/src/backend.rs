//! Remote service collaborator.
//!
//! Stores never talk to the network themselves. Every load and every
//! write-through goes through a [`Backend`], which the desktop shell (or
//! the monitor binary, or a test mock) provides.

use async_trait::async_trait;
use circle_core::{
    AccountId, CircleResult, LimitedAvatar, LimitedUserFriend, LimitedWorld, ResourceKind,
    ScopeId, StatusResponse, StoredAccount, StoreError, User, UserStatus,
};

/// Async access to the remote API and to shell-managed local state.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The user owning the session. With `None`, resolves whichever session
    /// the backend currently holds.
    async fn current_user(&self, account: Option<&AccountId>) -> CircleResult<User>;

    async fn friends(&self, account: &AccountId) -> CircleResult<Vec<LimitedUserFriend>>;

    /// Worlds uploaded by the account, most recently updated first.
    async fn uploaded_worlds(&self, account: &AccountId) -> CircleResult<Vec<LimitedWorld>>;

    /// Avatars uploaded by the account, most recently updated first.
    async fn uploaded_avatars(&self, account: &AccountId) -> CircleResult<Vec<LimitedAvatar>>;

    /// Accounts remembered on this device.
    async fn accounts(&self) -> CircleResult<Vec<StoredAccount>>;

    async fn remove_account(&self, account: &AccountId) -> CircleResult<()>;

    /// Update presence status; returns the updated user.
    async fn update_status(
        &self,
        account: &AccountId,
        status: UserStatus,
        description: &str,
    ) -> CircleResult<User>;

    async fn developer_mode(&self) -> CircleResult<bool>;

    async fn set_developer_mode(&self, enabled: bool) -> CircleResult<()>;

    /// Platform health from the public status page.
    async fn status(&self) -> CircleResult<StatusResponse>;
}

/// Account id for an account-scoped load, or `NoActiveAccount`.
pub(crate) fn require_account(scope: &ScopeId, resource: ResourceKind) -> CircleResult<&AccountId> {
    scope
        .as_ref()
        .ok_or_else(|| StoreError::NoActiveAccount { resource }.into())
}
