//! Synchronous listener sets with panic isolation.
//!
//! Every observable in this crate (account scope, resource stores, alert
//! store) fans change notifications out through a [`Listeners`] set.
//! Callbacks run on the caller's thread after the owner has released its
//! own lock, so a listener may call straight back into the store.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::error;

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct ListenerSet<A> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<A>)>>,
}

impl<A> ListenerSet<A> {
    fn remove(&self, id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

/// A set of listeners notified with `&A`.
pub struct Listeners<A> {
    inner: Arc<ListenerSet<A>>,
}

impl<A> Clone for Listeners<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> Default for Listeners<A> {
    fn default() -> Self {
        Self {
            inner: Arc::new(ListenerSet {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl<A> Listeners<A> {
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> fmt::Debug for Listeners<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}

impl<A: 'static> Listeners<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener without replaying anything.
    pub fn add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.register(Arc::new(listener)).0
    }

    /// Register a listener, then read the current value with `current` and
    /// deliver it to that listener alone.
    ///
    /// Reading after registration means a change racing with the subscribe
    /// is either replayed or notified, never lost.
    pub fn add_and_replay<F, C>(&self, listener: F, current: C) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
        C: FnOnce() -> A,
    {
        let (subscription, id, callback) = self.register(Arc::new(listener));
        invoke(id, &callback, &current());
        subscription
    }

    /// Deliver `value` to every registered listener.
    ///
    /// Listeners are snapshotted first, so a listener that subscribes or
    /// releases during delivery affects only the next notification.
    pub fn notify(&self, value: &A) {
        let snapshot: Vec<(u64, Callback<A>)> = {
            let entries = self.inner.entries.lock().unwrap_or_else(|err| err.into_inner());
            entries.clone()
        };
        for (id, callback) in snapshot {
            invoke(id, &callback, value);
        }
    }

    fn register(&self, callback: Callback<A>) -> (Subscription, u64, Callback<A>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push((id, Arc::clone(&callback)));

        let weak: Weak<ListenerSet<A>> = Arc::downgrade(&self.inner);
        let subscription = Subscription::new(move || {
            if let Some(set) = weak.upgrade() {
                set.remove(id);
            }
        });
        (subscription, id, callback)
    }
}

fn invoke<A>(id: u64, callback: &Callback<A>, value: &A) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
        error!(
            listener = id,
            panic = %panic_message(panic.as_ref()),
            "Listener panicked during notification"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Capability token for a registered listener.
///
/// Calling [`Subscription::release`] or dropping the token unregisters the
/// listener. Releasing more than once is impossible by construction.
#[must_use = "dropping a Subscription immediately unregisters its listener"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unregister the listener now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
