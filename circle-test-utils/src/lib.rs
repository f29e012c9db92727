//! Circle Test Utilities
//!
//! Shared test infrastructure for the Circle workspace:
//! - Scripted loaders with call counting and gating
//! - An in-memory mock backend
//! - Proptest generators for ids and entities
//! - Fixtures for common entities

// Re-export the deterministic clock from its source crate
pub use circle_store::ManualClock;

pub use circle_core::{
    AccountId, BackendError, CircleError, CircleResult, LimitedAvatar, LimitedUserFriend,
    LimitedWorld, ScopeId, StatusIndicator, StatusResponse, StoredAccount, User, UserStatus,
};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use circle_store::{Backend, ResourceLoader};
use tokio::sync::Semaphore;

// ============================================================================
// SCRIPTED LOADER
// ============================================================================

/// A [`ResourceLoader`] that replays scripted outcomes.
///
/// Queued outcomes are returned in order; once the queue is empty the
/// fallback (if any) is returned forever. A gated loader blocks every load
/// until [`ScriptedLoader::release`] hands out a permit, which lets tests
/// line up concurrent callers before the load completes.
pub struct ScriptedLoader<T> {
    queue: Mutex<VecDeque<CircleResult<T>>>,
    fallback: Mutex<Option<CircleResult<T>>>,
    calls: AtomicUsize,
    scopes: Mutex<Vec<ScopeId>>,
    gate: Option<Semaphore>,
    delay: Option<Duration>,
}

impl<T: Clone + Send + Sync> ScriptedLoader<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
            scopes: Mutex::new(Vec::new()),
            gate: None,
            delay: None,
        }
    }

    /// Loader that returns `result` on every call.
    pub fn always(result: CircleResult<T>) -> Self {
        let loader = Self::new();
        *loader.fallback.lock().unwrap() = Some(result);
        loader
    }

    /// Queue one outcome.
    pub fn then(self, result: CircleResult<T>) -> Self {
        self.queue.lock().unwrap().push_back(result);
        self
    }

    pub fn then_ok(self, value: T) -> Self {
        self.then(Ok(value))
    }

    pub fn then_err(self, error: impl Into<CircleError>) -> Self {
        self.then(Err(error.into()))
    }

    /// Block every load until a permit is released.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Sleep for `delay` inside every load (use with paused tokio time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Let `loads` gated loads proceed.
    pub fn release(&self, loads: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(loads);
        }
    }

    /// Number of loads started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Scopes passed to each load, in call order.
    pub fn scopes(&self) -> Vec<ScopeId> {
        self.scopes.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> CircleResult<T> {
        if let Some(result) = self.queue.lock().unwrap().pop_front() {
            return result;
        }
        self.fallback.lock().unwrap().clone().unwrap_or_else(|| {
            Err(BackendError::Unknown("no scripted response".to_string()).into())
        })
    }
}

impl<T: Clone + Send + Sync> Default for ScriptedLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ResourceLoader<T> for ScriptedLoader<T> {
    async fn load(&self, scope: &ScopeId) -> CircleResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scopes.lock().unwrap().push(scope.clone());

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_outcome()
    }
}

// ============================================================================
// MOCK BACKEND
// ============================================================================

#[derive(Default)]
struct MockState {
    session: Option<AccountId>,
    users: HashMap<AccountId, User>,
    friends: HashMap<AccountId, Vec<LimitedUserFriend>>,
    worlds: HashMap<AccountId, Vec<LimitedWorld>>,
    avatars: HashMap<AccountId, Vec<LimitedAvatar>>,
    accounts: Vec<StoredAccount>,
    developer_mode: bool,
    status: Option<StatusResponse>,
    failures: HashMap<&'static str, BackendError>,
    calls: HashMap<&'static str, usize>,
}

/// In-memory [`Backend`] with per-method failure injection and call counts.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user and make their account the backend's session.
    pub fn with_session(self, user: User) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.session = Some(user.id.clone());
            state.users.insert(user.id.clone(), user);
        }
        self
    }

    pub fn with_user(self, user: User) -> Self {
        self.state.lock().unwrap().users.insert(user.id.clone(), user);
        self
    }

    pub fn set_friends(&self, account: &AccountId, friends: Vec<LimitedUserFriend>) {
        self.state.lock().unwrap().friends.insert(account.clone(), friends);
    }

    pub fn set_worlds(&self, account: &AccountId, worlds: Vec<LimitedWorld>) {
        self.state.lock().unwrap().worlds.insert(account.clone(), worlds);
    }

    pub fn set_avatars(&self, account: &AccountId, avatars: Vec<LimitedAvatar>) {
        self.state.lock().unwrap().avatars.insert(account.clone(), avatars);
    }

    pub fn set_accounts(&self, accounts: Vec<StoredAccount>) {
        self.state.lock().unwrap().accounts = accounts;
    }

    pub fn set_status(&self, status: StatusResponse) {
        self.state.lock().unwrap().status = Some(status);
    }

    /// Make every call to `method` fail with `error` until cleared.
    pub fn fail(&self, method: &'static str, error: BackendError) {
        self.state.lock().unwrap().failures.insert(method, error);
    }

    pub fn clear_failure(&self, method: &'static str) {
        self.state.lock().unwrap().failures.remove(method);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    pub fn stored_developer_mode(&self) -> bool {
        self.state.lock().unwrap().developer_mode
    }

    fn enter(&self, method: &'static str) -> CircleResult<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_insert(0) += 1;
        match state.failures.get(method) {
            Some(error) => Err(error.clone().into()),
            None => Ok(state),
        }
    }
}

fn not_found(what: &str, account: &AccountId) -> CircleError {
    BackendError::http(404, format!("{} not found for {}", what, account)).into()
}

#[async_trait]
impl Backend for MockBackend {
    async fn current_user(&self, account: Option<&AccountId>) -> CircleResult<User> {
        let state = self.enter("current_user")?;
        let id = account
            .or(state.session.as_ref())
            .ok_or_else(|| CircleError::from(BackendError::auth("not logged in")))?;
        state
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::auth(format!("no session for {}", id)).into())
    }

    async fn friends(&self, account: &AccountId) -> CircleResult<Vec<LimitedUserFriend>> {
        let state = self.enter("friends")?;
        Ok(state.friends.get(account).cloned().unwrap_or_default())
    }

    async fn uploaded_worlds(&self, account: &AccountId) -> CircleResult<Vec<LimitedWorld>> {
        let state = self.enter("uploaded_worlds")?;
        Ok(state.worlds.get(account).cloned().unwrap_or_default())
    }

    async fn uploaded_avatars(&self, account: &AccountId) -> CircleResult<Vec<LimitedAvatar>> {
        let state = self.enter("uploaded_avatars")?;
        Ok(state.avatars.get(account).cloned().unwrap_or_default())
    }

    async fn accounts(&self) -> CircleResult<Vec<StoredAccount>> {
        let state = self.enter("accounts")?;
        Ok(state.accounts.clone())
    }

    async fn remove_account(&self, account: &AccountId) -> CircleResult<()> {
        let mut state = self.enter("remove_account")?;
        state.accounts.retain(|stored| &stored.user_id != account);
        Ok(())
    }

    async fn update_status(
        &self,
        account: &AccountId,
        status: UserStatus,
        description: &str,
    ) -> CircleResult<User> {
        let mut state = self.enter("update_status")?;
        let user = state
            .users
            .get_mut(account)
            .ok_or_else(|| not_found("user", account))?;
        user.status = status;
        user.status_description = description.to_string();
        Ok(user.clone())
    }

    async fn developer_mode(&self) -> CircleResult<bool> {
        let state = self.enter("developer_mode")?;
        Ok(state.developer_mode)
    }

    async fn set_developer_mode(&self, enabled: bool) -> CircleResult<()> {
        let mut state = self.enter("set_developer_mode")?;
        state.developer_mode = enabled;
        Ok(())
    }

    async fn status(&self) -> CircleResult<StatusResponse> {
        let state = self.enter("status")?;
        state
            .status
            .clone()
            .ok_or_else(|| BackendError::http(503, "status page unavailable").into())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Circle ids and entities.

    use super::*;
    use proptest::prelude::*;

    /// Generate a platform-style account id (`usr_` + hex).
    pub fn arb_account_id() -> impl Strategy<Value = AccountId> {
        "[0-9a-f]{8}".prop_map(|suffix| AccountId::new(format!("usr_{}", suffix)))
    }

    /// Generate a cache scope, including the `None` partition.
    pub fn arb_scope_id() -> impl Strategy<Value = ScopeId> {
        prop::option::of(arb_account_id())
    }

    pub fn arb_status_indicator() -> impl Strategy<Value = StatusIndicator> {
        prop_oneof![
            Just(StatusIndicator::None),
            Just(StatusIndicator::Minor),
            Just(StatusIndicator::Major),
            Just(StatusIndicator::Critical),
        ]
    }

    pub fn arb_user_status() -> impl Strategy<Value = UserStatus> {
        prop_oneof![
            Just(UserStatus::Active),
            Just(UserStatus::JoinMe),
            Just(UserStatus::AskMe),
            Just(UserStatus::Busy),
            Just(UserStatus::Offline),
        ]
    }

    /// Generate a friend who is either offline or in a random world instance.
    pub fn arb_friend() -> impl Strategy<Value = LimitedUserFriend> {
        (
            arb_account_id(),
            "[A-Za-z]{3,12}",
            arb_user_status(),
            prop::option::of("wrld_[0-9a-f]{6}:[0-9]{1,5}"),
        )
            .prop_map(|(id, name, status, location)| {
                let mut friend = fixtures::make_friend(id.as_str(), &name);
                friend.status = status;
                friend.location =
                    Some(location.unwrap_or_else(|| LimitedUserFriend::OFFLINE_LOCATION.to_string()));
                friend
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities for common testing scenarios.

    use super::*;
    use circle_core::{DeveloperType, ReleaseStatus, StatusPage, SystemStatus};

    pub fn make_user(id: &str, display_name: &str) -> User {
        User {
            id: AccountId::from(id),
            username: display_name.to_lowercase(),
            display_name: display_name.to_string(),
            status: UserStatus::Active,
            status_description: String::new(),
            bio: String::new(),
            developer_type: DeveloperType::None,
            location: None,
            current_avatar: None,
            current_avatar_thumbnail_image_url: None,
            profile_pic_override: None,
            user_icon: None,
            friends: Vec::new(),
            tags: Vec::new(),
            last_login: None,
        }
    }

    /// An offline friend.
    pub fn make_friend(id: &str, display_name: &str) -> LimitedUserFriend {
        LimitedUserFriend {
            id: id.to_string(),
            display_name: display_name.to_string(),
            status: UserStatus::Offline,
            status_description: String::new(),
            location: Some(LimitedUserFriend::OFFLINE_LOCATION.to_string()),
            platform: String::new(),
            last_platform: None,
            current_avatar_thumbnail_image_url: None,
            profile_pic_override: None,
            user_icon: None,
            developer_type: DeveloperType::None,
            is_friend: true,
            tags: Vec::new(),
        }
    }

    /// A friend in a world instance on PC.
    pub fn make_online_friend(id: &str, display_name: &str, location: &str) -> LimitedUserFriend {
        LimitedUserFriend {
            status: UserStatus::Active,
            location: Some(location.to_string()),
            platform: "standalonewindows".to_string(),
            ..make_friend(id, display_name)
        }
    }

    pub fn make_world(id: &str, name: &str) -> LimitedWorld {
        LimitedWorld {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            author_id: None,
            author_name: None,
            thumbnail_image_url: None,
            release_status: ReleaseStatus::Public,
            visits: Some(0),
            favorites: Some(0),
            occupants: Some(0),
            capacity: Some(16),
            updated_at: None,
            tags: Vec::new(),
        }
    }

    pub fn make_avatar(id: &str, name: &str) -> LimitedAvatar {
        LimitedAvatar {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            author_id: None,
            author_name: None,
            thumbnail_image_url: None,
            release_status: ReleaseStatus::Private,
            version: Some(1),
            updated_at: None,
            tags: Vec::new(),
        }
    }

    pub fn make_account(id: &str, display_name: &str, last_active: bool) -> StoredAccount {
        StoredAccount {
            user_id: AccountId::from(id),
            username: display_name.to_lowercase(),
            display_name: display_name.to_string(),
            avatar_url: None,
            avatar_fallback_url: None,
            last_login: "2024-01-01T00:00:00Z".to_string(),
            last_active,
        }
    }

    pub fn make_status(indicator: StatusIndicator, description: &str) -> StatusResponse {
        StatusResponse {
            page: StatusPage {
                id: "page".to_string(),
                name: "Platform".to_string(),
                url: "https://status.example.com".to_string(),
                time_zone: "Etc/UTC".to_string(),
                updated_at: "2024-01-01T00:00:00Z".to_string(),
            },
            status: SystemStatus {
                indicator,
                description: description.to_string(),
            },
        }
    }
}

// ============================================================================
// SELF-TESTS
// ============================================================================
