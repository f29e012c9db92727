//! Active account scope.

use std::sync::Mutex;

use circle_core::{scope_label, ScopeId};
use tracing::info;

use crate::observer::{Listeners, Subscription};

/// Holds the active account id and notifies on change.
#[derive(Debug, Default)]
pub struct AccountScope {
    active: Mutex<ScopeId>,
    listeners: Listeners<ScopeId>,
}

impl AccountScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(active: ScopeId) -> Self {
        Self {
            active: Mutex::new(active),
            listeners: Listeners::new(),
        }
    }

    pub fn active(&self) -> ScopeId {
        self.active
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Switch the active account. Returns `true` and notifies listeners
    /// only when the value actually changed.
    pub fn set_active(&self, next: ScopeId) -> bool {
        let previous = {
            let mut active = self.active.lock().unwrap_or_else(|err| err.into_inner());
            if *active == next {
                return false;
            }
            std::mem::replace(&mut *active, next.clone())
        };

        info!(
            from = %scope_label(&previous),
            to = %scope_label(&next),
            "Active account changed"
        );
        self.listeners.notify(&next);
        true
    }

    /// Subscribe to changes. The listener is invoked once immediately with
    /// the current value.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ScopeId) + Send + Sync + 'static,
    {
        self.listeners.add_and_replay(listener, || self.active())
    }
}
