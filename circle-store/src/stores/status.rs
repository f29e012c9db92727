//! Platform health, mirrored into the alert bar.
//!
//! Every time the cached status changes (poll, manual `set`, inspector
//! edit) a single non-dismissable alert is added, updated in place, or
//! removed to match the reported indicator. Clearing the cache removes the
//! alert; a failed poll leaves it alone.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use circle_core::{CircleResult, EntityId, ResourceKind, ScopeId, StatusIndicator, StatusResponse};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::alerts::{AlertPatch, AlertSpec, AlertStore, AlertVariant};
use crate::backend::Backend;
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::observer::Subscription;
use crate::resource::ResourceLoader;
use crate::scope::AccountScope;
use crate::store::ResourceStore;

struct StatusLoader {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl ResourceLoader<StatusResponse> for StatusLoader {
    async fn load(&self, _scope: &ScopeId) -> CircleResult<StatusResponse> {
        self.backend.status().await
    }
}

/// Alert severity for a status indicator; `None` when healthy.
pub fn status_alert_variant(indicator: StatusIndicator) -> Option<AlertVariant> {
    match indicator {
        StatusIndicator::None => None,
        StatusIndicator::Minor => Some(AlertVariant::Warning),
        StatusIndicator::Major => Some(AlertVariant::Error),
        StatusIndicator::Critical => Some(AlertVariant::Critical),
    }
}

/// Keeps at most one status alert in sync with the cached status.
struct StatusAlertSync {
    alerts: Arc<AlertStore>,
    alert_id: Mutex<Option<EntityId>>,
}

impl StatusAlertSync {
    fn current_id(&self) -> Option<EntityId> {
        *self.alert_id.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn set_id(&self, id: Option<EntityId>) {
        *self.alert_id.lock().unwrap_or_else(|err| err.into_inner()) = id;
    }

    fn remove(&self, reason: &str) {
        if let Some(id) = self.current_id() {
            self.alerts.remove_alert(id);
            self.set_id(None);
            debug!(alert_id = %id, reason, "Status alert removed");
        }
    }

    fn apply(&self, status: &Option<StatusResponse>) {
        let Some(status) = status else {
            self.remove("status cleared");
            return;
        };
        let Some(variant) = status_alert_variant(status.status.indicator) else {
            self.remove("platform healthy");
            return;
        };

        let message = status.status.description.clone();
        let metadata = status_metadata(status);

        // The alert may have been removed by the user or `clear_all`.
        if let Some(id) = self.current_id() {
            let patch = AlertPatch::new()
                .variant(variant)
                .message(message.clone())
                .metadata(metadata.clone());
            if self.alerts.update_alert(id, patch) {
                return;
            }
        }

        let id = self.alerts.add_alert(
            AlertSpec::new(variant, message)
                .non_dismissable()
                .with_metadata(metadata),
        );
        self.set_id(Some(id));
    }
}

fn status_metadata(status: &StatusResponse) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("source".to_string(), Value::from("status"));
    metadata.insert(
        "indicator".to_string(),
        serde_json::to_value(status.status.indicator).unwrap_or(Value::Null),
    );
    metadata.insert("page_url".to_string(), Value::from(status.page.url.clone()));
    metadata
}

/// Global platform status with a health alert.
pub struct StatusStore {
    store: ResourceStore<StatusResponse>,
    sync: Arc<StatusAlertSync>,
    _subscription: Subscription,
}

delegate_resource_store!(StatusStore, store, StatusResponse);

impl std::fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStore")
            .field("store", &self.store)
            .field("alert_id", &self.sync.current_id())
            .finish()
    }
}

impl StatusStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        scope: Arc<AccountScope>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
        alerts: Arc<AlertStore>,
    ) -> Self {
        let store = ResourceStore::new(
            ResourceKind::Status,
            config,
            Arc::new(StatusLoader { backend }),
            scope,
            clock,
        );
        let sync = Arc::new(StatusAlertSync {
            alerts,
            alert_id: Mutex::new(None),
        });

        let listener = Arc::clone(&sync);
        let subscription = store.subscribe(move |status| listener.apply(status));

        Self {
            store,
            sync,
            _subscription: subscription,
        }
    }

    /// Id of the alert currently mirroring the status, if any.
    pub fn alert_id(&self) -> Option<EntityId> {
        self.sync.current_id()
    }

    /// Fetch the status once, bypassing freshness. Failures are logged and
    /// leave the alert bar as it was.
    pub async fn poll_once(&self) -> CircleResult<StatusResponse> {
        poll(&self.store).await
    }

    /// Poll on `interval` until the returned handle is aborted.
    ///
    /// The first poll happens immediately. The alert stays in sync only
    /// while this store is alive.
    pub fn spawn_polling(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = poll(&store).await;
            }
        })
    }
}

async fn poll(store: &ResourceStore<StatusResponse>) -> CircleResult<StatusResponse> {
    match store.refresh().await {
        Ok(status) => {
            debug!(indicator = ?status.status.indicator, "Status polled");
            Ok(status)
        }
        Err(err) => {
            warn!(error = %err, "Status poll failed");
            Err(err)
        }
    }
}
