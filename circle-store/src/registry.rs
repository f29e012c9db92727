//! Keyed singleton registry.
//!
//! Guarantees at most one instance per well-known key for the lifetime of
//! the owning [`AppContext`](crate::AppContext).

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use circle_core::{CircleResult, StoreError};
use tracing::{debug, warn};

/// Well-known registry keys.
pub mod keys {
    pub const ACCOUNT_SCOPE: &str = "account_scope";
    pub const ALERTS: &str = "alerts";
    pub const USER: &str = "user";
    pub const WORLDS: &str = "worlds";
    pub const AVATARS: &str = "avatars";
    pub const ACCOUNTS: &str = "accounts";
    pub const DEVELOPER_MODE: &str = "developer_mode";
    pub const STATUS: &str = "status";
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Per-key cell. Created under the map lock, initialized outside it.
type Slot = Arc<OnceLock<Entry>>;

#[derive(Default)]
pub struct SingletonRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the instance registered under `key`, constructing it with
    /// `factory` on first use.
    ///
    /// The factory runs without the registry lock held, so it may register
    /// singletons under other keys. Concurrent callers for the same key
    /// block until the first factory finishes; it runs exactly once.
    /// A factory must not register its own key.
    pub fn register_singleton<S, F>(&self, key: &str, factory: F) -> CircleResult<Arc<S>>
    where
        S: Any + Send + Sync,
        F: FnOnce() -> S,
    {
        let slot = {
            let mut slots = self.lock_slots();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let entry = slot.get_or_init(|| {
            debug!(key, "Registered singleton");
            Arc::new(factory())
        });
        downcast(key, Arc::clone(entry))
    }

    /// Look up an existing instance without constructing one.
    pub fn get_singleton<S>(&self, key: &str) -> Option<Arc<S>>
    where
        S: Any + Send + Sync,
    {
        let entry = self.lookup(key)?;
        match entry.downcast::<S>() {
            Ok(instance) => Some(instance),
            Err(_) => {
                warn!(
                    key,
                    requested = std::any::type_name::<S>(),
                    "Registry entry holds a different type"
                );
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Keys with a constructed instance, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock_slots()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Constructed instance under `key`. A slot whose factory is still
    /// running counts as absent.
    fn lookup(&self, key: &str) -> Option<Entry> {
        self.lock_slots().get(key)?.get().cloned()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|err| err.into_inner())
    }
}

fn downcast<S: Any + Send + Sync>(key: &str, entry: Entry) -> CircleResult<Arc<S>> {
    entry.downcast::<S>().map_err(|_| {
        StoreError::RegistryTypeMismatch {
            key: key.to_string(),
        }
        .into()
    })
}
