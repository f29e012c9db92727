//! Developer inspector over every registered store.
//!
//! Lists each store's partitions as [`ScopeDebugRecord`]s and lets a
//! developer edit, clear, or expire one partition by store name.

use std::sync::Arc;

use circle_core::{CircleResult, DebugValue, ResourceKind, ScopeId, StoreError};
use serde::Serialize;
use tracing::info;

use crate::resource::Resource;
use crate::store::{ResourceStore, ScopeDebugRecord};

/// Type-erased view of a store for tooling.
pub trait InspectableStore: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn debug_records(&self) -> Vec<ScopeDebugRecord>;

    fn apply_debug_value(&self, scope: Option<&ScopeId>, value: DebugValue) -> CircleResult<()>;

    fn clear_scope(&self, scope: Option<&ScopeId>);

    fn mark_scope_stale(&self, scope: Option<&ScopeId>);
}

impl<T: Resource> InspectableStore for ResourceStore<T> {
    fn kind(&self) -> ResourceKind {
        ResourceStore::kind(self)
    }

    fn debug_records(&self) -> Vec<ScopeDebugRecord> {
        ResourceStore::debug_records(self)
    }

    fn apply_debug_value(&self, scope: Option<&ScopeId>, value: DebugValue) -> CircleResult<()> {
        ResourceStore::apply_debug_value(self, scope, value)
    }

    fn clear_scope(&self, scope: Option<&ScopeId>) {
        self.clear(scope)
    }

    fn mark_scope_stale(&self, scope: Option<&ScopeId>) {
        self.mark_stale(scope)
    }
}

/// One store's entry in an inspector report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreReport {
    pub name: &'static str,
    pub kind: ResourceKind,
    pub records: Vec<ScopeDebugRecord>,
}

#[derive(Default)]
pub struct StoreInspector {
    stores: Vec<Arc<dyn InspectableStore>>,
}

impl std::fmt::Debug for StoreInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInspector")
            .field("stores", &self.store_names())
            .finish()
    }
}

impl StoreInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, store: Arc<dyn InspectableStore>) {
        self.stores.push(store);
    }

    pub fn with_store(mut self, store: Arc<dyn InspectableStore>) -> Self {
        self.register(store);
        self
    }

    pub fn store_names(&self) -> Vec<&'static str> {
        self.stores.iter().map(|store| store.name()).collect()
    }

    /// Debug records of every store, in registration order.
    pub fn report(&self) -> Vec<StoreReport> {
        self.stores
            .iter()
            .map(|store| StoreReport {
                name: store.name(),
                kind: store.kind(),
                records: store.debug_records(),
            })
            .collect()
    }

    pub fn edit(&self, name: &str, scope: Option<&ScopeId>, value: DebugValue) -> CircleResult<()> {
        let store = self.find(name)?;
        store.apply_debug_value(scope, value)?;
        info!(store = name, "Cache entry edited from inspector");
        Ok(())
    }

    pub fn clear(&self, name: &str, scope: Option<&ScopeId>) -> CircleResult<()> {
        self.find(name)?.clear_scope(scope);
        Ok(())
    }

    pub fn mark_stale(&self, name: &str, scope: Option<&ScopeId>) -> CircleResult<()> {
        self.find(name)?.mark_scope_stale(scope);
        Ok(())
    }

    fn find(&self, name: &str) -> CircleResult<&Arc<dyn InspectableStore>> {
        self.stores
            .iter()
            .find(|store| store.name() == name)
            .ok_or_else(|| {
                StoreError::UnknownStore {
                    name: name.to_string(),
                }
                .into()
            })
    }
}
