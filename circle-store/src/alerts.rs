//! Ordered, navigable collection of transient notices.
//!
//! The alert bar shows one alert at a time; `current_index` tracks which.
//! Invariant: `current_index < alerts.len()` whenever the list is non-empty,
//! and `current_index == 0` when it is empty.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use circle_core::{new_entity_id, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::observer::{Listeners, Subscription};

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertVariant {
    Info,
    Warning,
    Error,
    Critical,
}

/// Callback attached to an alert's action button.
pub type AlertAction = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Serialize)]
pub struct Alert {
    pub id: EntityId,
    pub variant: AlertVariant,
    pub message: String,
    pub dismissable: bool,
    #[serde(skip)]
    pub action: Option<AlertAction>,
    pub created_at: Timestamp,
    pub metadata: Option<Map<String, Value>>,
}

impl Alert {
    /// Run the attached action. Returns `false` when there is none.
    pub fn trigger(&self) -> bool {
        match &self.action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alert")
            .field("id", &self.id)
            .field("variant", &self.variant)
            .field("message", &self.message)
            .field("dismissable", &self.dismissable)
            .field("has_action", &self.action.is_some())
            .field("created_at", &self.created_at)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Input for [`AlertStore::add_alert`].
#[derive(Clone)]
pub struct AlertSpec {
    pub variant: AlertVariant,
    pub message: String,
    pub dismissable: bool,
    pub action: Option<AlertAction>,
    pub metadata: Option<Map<String, Value>>,
}

impl AlertSpec {
    /// A dismissable alert without action or metadata.
    pub fn new(variant: AlertVariant, message: impl Into<String>) -> Self {
        Self {
            variant,
            message: message.into(),
            dismissable: true,
            action: None,
            metadata: None,
        }
    }

    pub fn non_dismissable(mut self) -> Self {
        self.dismissable = false;
        self
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Partial update for [`AlertStore::update_alert`]. Unset fields are kept.
#[derive(Clone, Default)]
pub struct AlertPatch {
    pub variant: Option<AlertVariant>,
    pub message: Option<String>,
    pub dismissable: Option<bool>,
    pub action: Option<AlertAction>,
    pub metadata: Option<Map<String, Value>>,
}

impl AlertPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variant(mut self, variant: AlertVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn dismissable(mut self, dismissable: bool) -> Self {
        self.dismissable = Some(dismissable);
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn apply(self, alert: &mut Alert) {
        if let Some(variant) = self.variant {
            alert.variant = variant;
        }
        if let Some(message) = self.message {
            alert.message = message;
        }
        if let Some(dismissable) = self.dismissable {
            alert.dismissable = dismissable;
        }
        if let Some(action) = self.action {
            alert.action = Some(action);
        }
        if let Some(metadata) = self.metadata {
            alert.metadata = Some(metadata);
        }
    }
}

/// Point-in-time copy of the alert list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertSnapshot {
    pub alerts: Vec<Alert>,
    pub current_index: usize,
}

impl AlertSnapshot {
    pub fn current(&self) -> Option<&Alert> {
        self.alerts.get(self.current_index)
    }
}

#[derive(Default)]
struct AlertState {
    alerts: Vec<Alert>,
    current_index: usize,
}

impl AlertState {
    fn clamp_index(&mut self) {
        self.current_index = self
            .current_index
            .min(self.alerts.len().saturating_sub(1));
    }

    fn snapshot(&self) -> AlertSnapshot {
        AlertSnapshot {
            alerts: self.alerts.clone(),
            current_index: self.current_index,
        }
    }
}

pub struct AlertStore {
    state: Mutex<AlertState>,
    listeners: Listeners<AlertSnapshot>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AlertStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertStore")
            .field("alert_count", &self.alert_count())
            .field("subscribers", &self.listeners.len())
            .finish()
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AlertStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(AlertState::default()),
            listeners: Listeners::new(),
            clock,
        }
    }

    /// Append an alert and return its id.
    pub fn add_alert(&self, spec: AlertSpec) -> EntityId {
        let alert = Alert {
            id: new_entity_id(),
            variant: spec.variant,
            message: spec.message,
            dismissable: spec.dismissable,
            action: spec.action,
            created_at: self.clock.now(),
            metadata: spec.metadata,
        };
        let id = alert.id;
        debug!(alert_id = %id, variant = ?alert.variant, "Alert added");

        self.mutate(|state| {
            state.alerts.push(alert);
            true
        });
        id
    }

    pub fn update_alert(&self, id: EntityId, patch: AlertPatch) -> bool {
        self.mutate(|state| match state.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                patch.apply(alert);
                true
            }
            None => false,
        })
    }

    pub fn remove_alert(&self, id: EntityId) -> bool {
        let removed = self.mutate(|state| {
            let before = state.alerts.len();
            state.alerts.retain(|a| a.id != id);
            state.clamp_index();
            state.alerts.len() != before
        });
        if removed {
            debug!(alert_id = %id, "Alert removed");
        }
        removed
    }

    pub fn clear_all(&self) {
        self.mutate(|state| {
            let had_alerts = !state.alerts.is_empty();
            state.alerts.clear();
            state.current_index = 0;
            had_alerts
        });
    }

    /// Remove every dismissable alert, keeping the rest in order.
    pub fn clear_dismissable(&self) {
        self.mutate(|state| {
            let before = state.alerts.len();
            state.alerts.retain(|a| !a.dismissable);
            state.clamp_index();
            state.alerts.len() != before
        });
    }

    /// Advance to the next alert, wrapping around.
    pub fn next_alert(&self) {
        self.mutate(|state| {
            let len = state.alerts.len();
            if len == 0 {
                return false;
            }
            let next = (state.current_index + 1) % len;
            let moved = next != state.current_index;
            state.current_index = next;
            moved
        });
    }

    /// Step back to the previous alert, wrapping around.
    pub fn previous_alert(&self) {
        self.mutate(|state| {
            let len = state.alerts.len();
            if len == 0 {
                return false;
            }
            let previous = (state.current_index + len - 1) % len;
            let moved = previous != state.current_index;
            state.current_index = previous;
            moved
        });
    }

    /// Jump to `index`. Out-of-range indices are ignored with a warning.
    pub fn set_current_index(&self, index: usize) {
        self.mutate(|state| {
            if index >= state.alerts.len() {
                warn!(
                    index,
                    alert_count = state.alerts.len(),
                    "Ignoring out-of-range alert index"
                );
                return false;
            }
            let moved = index != state.current_index;
            state.current_index = index;
            moved
        });
    }

    pub fn current_alert(&self) -> Option<Alert> {
        let state = self.lock_state();
        state.alerts.get(state.current_index).cloned()
    }

    pub fn get_alert(&self, id: EntityId) -> Option<Alert> {
        self.lock_state().alerts.iter().find(|a| a.id == id).cloned()
    }

    pub fn has_alerts(&self) -> bool {
        !self.lock_state().alerts.is_empty()
    }

    pub fn alert_count(&self) -> usize {
        self.lock_state().alerts.len()
    }

    pub fn current_index(&self) -> usize {
        self.lock_state().current_index
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        self.lock_state().snapshot()
    }

    /// Subscribe to list changes. Replays the current snapshot immediately.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AlertSnapshot) + Send + Sync + 'static,
    {
        self.listeners.add_and_replay(listener, || self.snapshot())
    }

    fn lock_state(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Apply `change` under the lock; notify after releasing it when the
    /// change reports that something moved.
    fn mutate<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut AlertState) -> bool,
    {
        let snapshot = {
            let mut state = self.lock_state();
            if !change(&mut state) {
                return false;
            }
            state.snapshot()
        };
        self.listeners.notify(&snapshot);
        true
    }
}
