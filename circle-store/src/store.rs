//! Generic per-scope resource cache.
//!
//! A [`ResourceStore`] keeps one [`CacheEntry`] per cache partition. Reads
//! through [`ResourceStore::ensure`] return a fresh cached value when there
//! is one, join the outstanding load when one is in flight, and otherwise
//! start exactly one new load for that partition.
//!
//! # Fan-in
//!
//! The in-flight load is a [`Shared`] future stored in the entry. Every
//! caller awaiting the same partition polls the same future, so the loader
//! runs once and all callers observe the same `Ok` or the same `Err`. Writing
//! the result and clearing the slot happen inside the shared future, so they
//! run once no matter which awaiter drives it to completion. A load whose
//! callers all went away stays in the slot and resumes on the next `ensure`.
//!
//! # Notification
//!
//! Subscribers observe only the active partition. Writes to any other
//! partition are silent until that partition becomes active, at which point
//! account-scoped stores re-emit its snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use circle_core::{
    scope_label, CircleResult, DebugValue, DurationMs, ResourceKind, ScopeId, StoreError,
    Timestamp,
};
use futures_util::future::{abortable, AbortHandle, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{Scoping, StoreConfig};
use crate::freshness::{age_ms, is_stale, EntryState};
use crate::observer::{Listeners, Subscription};
use crate::resource::{Resource, ResourceLoader};
use crate::scope::AccountScope;

type SharedFetch<T> = Shared<BoxFuture<'static, CircleResult<T>>>;

struct Inflight<T: Resource> {
    generation: u64,
    future: SharedFetch<T>,
    abort: AbortHandle,
}

/// Cached state of one partition.
struct CacheEntry<T: Resource> {
    value: Option<T>,
    /// `None` when never fetched or explicitly marked stale.
    updated_at: Option<Timestamp>,
    inflight: Option<Inflight<T>>,
}

impl<T: Resource> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            value: None,
            updated_at: None,
            inflight: None,
        }
    }
}

/// Options for [`ResourceStore::ensure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureOptions {
    /// Skip the freshness check. An in-flight load is still shared.
    pub force: bool,
    /// Partition to read. `None` means the active partition.
    pub scope: Option<ScopeId>,
    /// Per-call load timeout, overriding [`StoreConfig::fetch_timeout`].
    pub timeout: Option<Duration>,
}

impl EnsureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a forced reload of the active partition.
    pub fn forced() -> Self {
        Self::default().with_force(true)
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn for_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for [`ResourceStore::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Store the value without a timestamp so the next `ensure` reloads it.
    pub stale: bool,
    /// Partition to write. `None` means the active partition.
    pub scope: Option<ScopeId>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn for_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Inspector view of one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeDebugRecord {
    pub scope_id: ScopeId,
    pub cache: DebugValue,
    pub updated_at: Option<Timestamp>,
    pub age_ms: Option<DurationMs>,
    pub stale: bool,
    pub inflight: bool,
    pub is_active_scope: bool,
}

struct StoreInner<T: Resource> {
    kind: ResourceKind,
    config: StoreConfig,
    loader: Arc<dyn ResourceLoader<T>>,
    clock: Arc<dyn Clock>,
    scope: Arc<AccountScope>,
    entries: Mutex<HashMap<ScopeId, CacheEntry<T>>>,
    listeners: Listeners<Option<T>>,
    next_generation: AtomicU64,
    scope_subscription: Mutex<Option<Subscription>>,
}

/// Reactive cache for one resource type.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct ResourceStore<T: Resource> {
    inner: Arc<StoreInner<T>>,
}

impl<T: Resource> Clone for ResourceStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Resource> std::fmt::Debug for ResourceStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("kind", &self.inner.kind)
            .field("config", &self.inner.config)
            .field("subscribers", &self.inner.listeners.len())
            .finish()
    }
}

impl<T: Resource> ResourceStore<T> {
    /// Create a store. Account-scoped stores start following `scope`
    /// immediately.
    pub fn new(
        kind: ResourceKind,
        config: StoreConfig,
        loader: Arc<dyn ResourceLoader<T>>,
        scope: Arc<AccountScope>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = Arc::new(StoreInner {
            kind,
            config,
            loader,
            clock,
            scope,
            entries: Mutex::new(HashMap::new()),
            listeners: Listeners::new(),
            next_generation: AtomicU64::new(1),
            scope_subscription: Mutex::new(None),
        });

        if inner.config.scoping == Scoping::Account {
            let weak: Weak<StoreInner<T>> = Arc::downgrade(&inner);
            let subscription = inner.scope.subscribe(move |next| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_scope_changed(next);
                }
            });
            *inner.lock_subscription() = Some(subscription);
        }

        Self { inner }
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Partition currently observed by subscribers.
    pub fn active_scope(&self) -> ScopeId {
        self.inner.active_scope()
    }

    /// Read a partition without fetching. `None` reads the active one.
    pub fn snapshot(&self, scope: Option<&ScopeId>) -> Option<T> {
        let scope = self.inner.resolve_scope(scope);
        self.inner
            .lock_entries()
            .get(&scope)
            .and_then(|entry| entry.value.clone())
    }

    /// Subscribe to the active partition. The listener receives the current
    /// snapshot once, synchronously, before this returns.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Option<T>) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .add_and_replay(listener, || self.snapshot(None))
    }

    /// Return a fresh value, loading it if needed.
    ///
    /// Load failures propagate unchanged and leave the cached value as it
    /// was. There is no automatic retry.
    pub async fn ensure(&self, options: EnsureOptions) -> CircleResult<T> {
        let scope = self.inner.resolve_scope(options.scope.as_ref());
        let fetch = {
            let mut entries = self.inner.lock_entries();
            let now = self.inner.clock.now();
            let entry = entries.entry(scope.clone()).or_default();

            if !options.force {
                if let Some(value) = &entry.value {
                    if !is_stale(entry.updated_at, now, self.inner.config.staleness) {
                        debug!(
                            store = %self.inner.kind,
                            scope = %scope_label(&scope),
                            "Serving fresh cached value"
                        );
                        return Ok(value.clone());
                    }
                }
            }

            match &entry.inflight {
                Some(inflight) => {
                    debug!(
                        store = %self.inner.kind,
                        scope = %scope_label(&scope),
                        generation = inflight.generation,
                        "Joining in-flight load"
                    );
                    inflight.future.clone()
                }
                None => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let timeout = options.timeout.or(self.inner.config.fetch_timeout);
                    let (future, abort) =
                        StoreInner::start_fetch(&self.inner, scope.clone(), generation, timeout);
                    entry.inflight = Some(Inflight {
                        generation,
                        future: future.clone(),
                        abort,
                    });
                    future
                }
            }
        };

        fetch.await
    }

    /// Reload the active partition regardless of freshness.
    pub async fn refresh(&self) -> CircleResult<T> {
        self.ensure(EnsureOptions::forced()).await
    }

    /// Write a partition. The timestamp is set to now unless the value is
    /// `None` or `options.stale` is set.
    pub fn set(&self, value: Option<T>, options: SetOptions) {
        let scope = self.inner.resolve_scope(options.scope.as_ref());
        let now = self.inner.clock.now();
        let changed = {
            let mut entries = self.inner.lock_entries();
            let entry = entries.entry(scope.clone()).or_default();
            entry.updated_at = match (&value, options.stale) {
                (Some(_), false) => Some(now),
                _ => None,
            };
            entry.value = value;
            self.inner
                .is_active(&scope)
                .then(|| entry.value.clone())
        };

        debug!(
            store = %self.inner.kind,
            scope = %scope_label(&scope),
            stale = options.stale,
            "Cache entry written"
        );
        if let Some(snapshot) = changed {
            self.inner.listeners.notify(&snapshot);
        }
    }

    /// Reset a partition to empty.
    pub fn clear(&self, scope: Option<&ScopeId>) {
        let options = SetOptions {
            stale: false,
            scope: scope.cloned(),
        };
        self.set(None, options);
    }

    /// Force the next `ensure` to reload while keeping the value readable.
    /// Does not notify.
    pub fn mark_stale(&self, scope: Option<&ScopeId>) {
        let scope = self.inner.resolve_scope(scope);
        if let Some(entry) = self.inner.lock_entries().get_mut(&scope) {
            entry.updated_at = None;
        }
        debug!(
            store = %self.inner.kind,
            scope = %scope_label(&scope),
            "Cache entry marked stale"
        );
    }

    /// Mutate a cached value in place, keeping its timestamp.
    ///
    /// `mutate` reports whether it changed anything; listeners are notified
    /// only then. Returns `false` without calling `mutate` when the
    /// partition is empty.
    pub fn update<F>(&self, scope: Option<&ScopeId>, mutate: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        let scope = self.inner.resolve_scope(scope);
        let changed = {
            let mut entries = self.inner.lock_entries();
            let Some(value) = entries.get_mut(&scope).and_then(|entry| entry.value.as_mut())
            else {
                return false;
            };
            if !mutate(value) {
                return false;
            }
            let snapshot = Some(value.clone());
            (snapshot, self.inner.is_active(&scope))
        };

        if let (snapshot, true) = changed {
            self.inner.listeners.notify(&snapshot);
        }
        true
    }

    /// Lifecycle state of a partition.
    pub fn state(&self, scope: Option<&ScopeId>) -> EntryState {
        let scope = self.inner.resolve_scope(scope);
        let now = self.inner.clock.now();
        let entries = self.inner.lock_entries();
        match entries.get(&scope) {
            None => EntryState::Empty,
            Some(entry) if entry.inflight.is_some() => EntryState::Fetching,
            Some(entry) if entry.value.is_none() => EntryState::Empty,
            Some(entry) if is_stale(entry.updated_at, now, self.inner.config.staleness) => {
                EntryState::Stale
            }
            Some(_) => EntryState::Fresh,
        }
    }

    /// Abort the outstanding load of a partition.
    ///
    /// Awaiters of the aborted load receive [`StoreError::FetchCancelled`],
    /// the cached value is untouched, and the next `ensure` starts a new
    /// load. Returns `false` when nothing was in flight.
    pub fn cancel_inflight(&self, scope: Option<&ScopeId>) -> bool {
        let scope = self.inner.resolve_scope(scope);
        let inflight = self
            .inner
            .lock_entries()
            .get_mut(&scope)
            .and_then(|entry| entry.inflight.take());

        match inflight {
            Some(inflight) => {
                inflight.abort.abort();
                info!(
                    store = %self.inner.kind,
                    scope = %scope_label(&scope),
                    generation = inflight.generation,
                    "Cancelled in-flight load"
                );
                true
            }
            None => false,
        }
    }

    /// Every partition this store has seen, active first, then by label.
    pub fn debug_records(&self) -> Vec<ScopeDebugRecord> {
        let now = self.inner.clock.now();
        let active = self.inner.active_scope();
        let window = self.inner.config.staleness;

        let mut records: Vec<ScopeDebugRecord> = self
            .inner
            .lock_entries()
            .iter()
            .map(|(scope, entry)| ScopeDebugRecord {
                scope_id: scope.clone(),
                cache: entry
                    .value
                    .as_ref()
                    .map(DebugValue::capture)
                    .unwrap_or_default(),
                updated_at: entry.updated_at,
                age_ms: age_ms(entry.updated_at, now),
                stale: is_stale(entry.updated_at, now, window),
                inflight: entry.inflight.is_some(),
                is_active_scope: *scope == active,
            })
            .collect();

        records.sort_by(|a, b| {
            b.is_active_scope
                .cmp(&a.is_active_scope)
                .then_with(|| scope_label(&a.scope_id).cmp(scope_label(&b.scope_id)))
        });
        records
    }

    /// Replace a partition's value with an edited debug value.
    ///
    /// `DebugValue::Null` clears the partition.
    pub fn apply_debug_value(&self, scope: Option<&ScopeId>, value: DebugValue) -> CircleResult<()> {
        let options = SetOptions {
            stale: false,
            scope: scope.cloned(),
        };
        if value.is_null() {
            self.set(None, options);
            return Ok(());
        }

        let decoded: T = serde_json::from_value(value.to_json()).map_err(|err| {
            StoreError::Decode {
                resource: self.inner.kind,
                reason: err.to_string(),
            }
        })?;
        self.set(Some(decoded), options);
        Ok(())
    }
}

impl<T: Resource> StoreInner<T> {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<ScopeId, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.scope_subscription
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn active_scope(&self) -> ScopeId {
        match self.config.scoping {
            Scoping::Account => self.scope.active(),
            Scoping::Global => None,
        }
    }

    fn resolve_scope(&self, requested: Option<&ScopeId>) -> ScopeId {
        match self.config.scoping {
            Scoping::Global => None,
            Scoping::Account => requested.cloned().unwrap_or_else(|| self.scope.active()),
        }
    }

    fn is_active(&self, scope: &ScopeId) -> bool {
        *scope == self.active_scope()
    }

    /// Build the shared load future for a partition. Nothing runs until the
    /// first awaiter polls it.
    fn start_fetch(
        this: &Arc<Self>,
        scope: ScopeId,
        generation: u64,
        timeout: Option<Duration>,
    ) -> (SharedFetch<T>, AbortHandle) {
        let inner = Arc::clone(this);
        let kind = this.kind;

        let load = async move {
            debug!(
                store = %inner.kind,
                scope = %scope_label(&scope),
                generation,
                "Loading resource"
            );
            let result = match timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, inner.loader.load(&scope)).await {
                        Ok(result) => result,
                        Err(_) => Err(StoreError::FetchTimeout {
                            resource: inner.kind,
                            timeout: limit,
                        }
                        .into()),
                    }
                }
                None => inner.loader.load(&scope).await,
            };
            inner.complete_fetch(&scope, generation, result)
        };

        let (load, abort) = abortable(load);
        let future = async move {
            match load.await {
                Ok(result) => result,
                Err(_aborted) => Err(StoreError::FetchCancelled { resource: kind }.into()),
            }
        }
        .boxed()
        .shared();

        (future, abort)
    }

    /// Record a load outcome. Runs once per load, inside the shared future.
    fn complete_fetch(
        &self,
        scope: &ScopeId,
        generation: u64,
        result: CircleResult<T>,
    ) -> CircleResult<T> {
        let now = self.clock.now();
        let changed = {
            let mut entries = self.lock_entries();
            let entry = entries.entry(scope.clone()).or_default();

            let current = entry
                .inflight
                .as_ref()
                .is_some_and(|inflight| inflight.generation == generation);
            if !current {
                debug!(
                    store = %self.kind,
                    scope = %scope_label(scope),
                    generation,
                    "Discarding result of detached load"
                );
                return result;
            }
            entry.inflight = None;

            match &result {
                Ok(value) => {
                    entry.value = Some(value.clone());
                    entry.updated_at = Some(now);
                    self.is_active(scope).then(|| entry.value.clone())
                }
                Err(err) => {
                    warn!(
                        store = %self.kind,
                        scope = %scope_label(scope),
                        error = %err,
                        "Resource load failed"
                    );
                    None
                }
            }
        };

        if let Some(snapshot) = changed {
            self.listeners.notify(&snapshot);
        }
        result
    }

    fn on_scope_changed(&self, next: &ScopeId) {
        let snapshot = {
            let mut entries = self.lock_entries();
            entries.entry(next.clone()).or_default().value.clone()
        };
        debug!(
            store = %self.kind,
            scope = %scope_label(next),
            "Re-emitting snapshot for new active account"
        );
        self.listeners.notify(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::resource::FnLoader;
    use circle_core::{AccountId, BackendError, CircleError};
    use std::sync::atomic::AtomicUsize;

    fn account(id: &str) -> ScopeId {
        Some(AccountId::from(id))
    }

    fn counting_store(
        config: StoreConfig,
        scope: Arc<AccountScope>,
        clock: ManualClock,
    ) -> (ResourceStore<u32>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = FnLoader::new(move |_scope: ScopeId| {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u32 + 1;
            async move { Ok::<_, CircleError>(n * 10) }
        });
        let store = ResourceStore::new(
            ResourceKind::Worlds,
            config,
            Arc::new(loader),
            scope,
            Arc::new(clock),
        );
        (store, calls)
    }

    #[tokio::test]
    async fn test_window_scenario() {
        let clock = ManualClock::at_epoch();
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let config = StoreConfig::new().with_staleness(Duration::from_millis(1000));
        let (store, calls) = counting_store(config, scope, clock.clone());

        assert_eq!(store.ensure(EnsureOptions::new()).await.unwrap(), 10);
        clock.advance_ms(500);
        assert_eq!(store.ensure(EnsureOptions::new()).await.unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance_ms(1000);
        assert_eq!(store.state(None), EntryState::Stale);
        assert_eq!(store.ensure(EnsureOptions::new()).await.unwrap(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_bypasses_freshness() {
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let (store, calls) =
            counting_store(StoreConfig::new(), scope, ManualClock::at_epoch());

        store.ensure(EnsureOptions::new()).await.unwrap();
        assert_eq!(store.refresh().await.unwrap(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mark_stale_keeps_value_and_triggers_reload() {
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let (store, calls) =
            counting_store(StoreConfig::new(), scope, ManualClock::at_epoch());

        store.ensure(EnsureOptions::new()).await.unwrap();
        store.mark_stale(None);
        assert_eq!(store.snapshot(None), Some(10));
        assert_eq!(store.state(None), EntryState::Stale);

        assert_eq!(store.ensure(EnsureOptions::new()).await.unwrap(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_stale_and_clear() {
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let (store, _) = counting_store(StoreConfig::new(), scope, ManualClock::at_epoch());

        store.set(Some(5), SetOptions::new().stale());
        assert_eq!(store.state(None), EntryState::Stale);
        store.set(Some(6), SetOptions::new());
        assert_eq!(store.state(None), EntryState::Fresh);
        store.clear(None);
        assert_eq!(store.state(None), EntryState::Empty);
        assert_eq!(store.snapshot(None), None);
    }

    #[test]
    fn test_global_store_ignores_requested_scope() {
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let config = StoreConfig::new().with_scoping(Scoping::Global);
        let (store, _) = counting_store(config, Arc::clone(&scope), ManualClock::at_epoch());

        store.set(Some(1), SetOptions::new().for_scope(account("usr_b")));
        assert_eq!(store.snapshot(None), Some(1));
        assert_eq!(store.active_scope(), None);
    }

    #[test]
    fn test_update_keeps_timestamp_and_notifies() {
        let clock = ManualClock::at_epoch();
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let (store, _) = counting_store(StoreConfig::new(), scope, clock.clone());

        assert!(!store.update(None, |v| {
            *v += 1;
            true
        }));
        store.set(Some(1), SetOptions::new());
        clock.advance_ms(250);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(move |v| sink.lock().unwrap().push(*v));

        assert!(store.update(None, |v| {
            *v += 1;
            true
        }));
        assert!(!store.update(None, |_| false));
        assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(2)]);
        assert_eq!(store.debug_records()[0].age_ms, Some(250));
    }

    #[tokio::test]
    async fn test_load_error_is_logged_and_propagated() {
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let loader = FnLoader::new(|_scope: ScopeId| async {
            Err::<u32, _>(CircleError::from(BackendError::network("offline")))
        });
        let store = ResourceStore::new(
            ResourceKind::Avatars,
            StoreConfig::new(),
            Arc::new(loader),
            scope,
            Arc::new(ManualClock::at_epoch()),
        );

        let err = store.ensure(EnsureOptions::new()).await.unwrap_err();
        assert_eq!(err, CircleError::from(BackendError::network("offline")));
        assert_eq!(store.state(None), EntryState::Empty);
    }

    #[test]
    fn test_apply_debug_value_decodes_or_rejects() {
        let scope = Arc::new(AccountScope::with_active(account("usr_a")));
        let (store, _) = counting_store(StoreConfig::new(), scope, ManualClock::at_epoch());

        store.apply_debug_value(None, DebugValue::Number(42.0)).unwrap();
        assert_eq!(store.snapshot(None), Some(42));

        let err = store
            .apply_debug_value(None, DebugValue::String("nope".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            CircleError::Store(StoreError::Decode {
                resource: ResourceKind::Worlds,
                ..
            })
        ));
        assert_eq!(store.snapshot(None), Some(42));

        store.apply_debug_value(None, DebugValue::Null).unwrap();
        assert_eq!(store.snapshot(None), None);
    }
}
