//! Delegation macro for the specialized stores.
//!
//! Each specialized store wraps a [`ResourceStore`](crate::ResourceStore)
//! and exposes its common surface unchanged, adding resource-specific
//! helpers next to it.

/// Forward the common [`ResourceStore`](crate::ResourceStore) API from a
/// wrapper type to one of its fields.
///
/// # Example
///
/// ```ignore
/// pub struct WorldsStore {
///     store: ResourceStore<Vec<LimitedWorld>>,
/// }
///
/// delegate_resource_store!(WorldsStore, store, Vec<LimitedWorld>);
/// ```
macro_rules! delegate_resource_store {
    ($wrapper:ident, $field:ident, $resource:ty) => {
        impl $wrapper {
            /// The underlying cache.
            pub fn resource_store(&self) -> &$crate::ResourceStore<$resource> {
                &self.$field
            }

            /// Read a partition without fetching. `None` reads the active one.
            pub fn snapshot(
                &self,
                scope: Option<&::circle_core::ScopeId>,
            ) -> Option<$resource> {
                self.$field.snapshot(scope)
            }

            /// Subscribe to the active partition; replays the current value.
            pub fn subscribe<F>(&self, listener: F) -> $crate::Subscription
            where
                F: Fn(&Option<$resource>) + Send + Sync + 'static,
            {
                self.$field.subscribe(listener)
            }

            /// Return a fresh value for the active partition, loading it if needed.
            pub async fn ensure(&self) -> ::circle_core::CircleResult<$resource> {
                self.$field.ensure($crate::EnsureOptions::new()).await
            }

            pub async fn ensure_with(
                &self,
                options: $crate::EnsureOptions,
            ) -> ::circle_core::CircleResult<$resource> {
                self.$field.ensure(options).await
            }

            pub async fn refresh(&self) -> ::circle_core::CircleResult<$resource> {
                self.$field.refresh().await
            }

            pub fn set(&self, value: Option<$resource>, options: $crate::SetOptions) {
                self.$field.set(value, options)
            }

            pub fn clear(&self, scope: Option<&::circle_core::ScopeId>) {
                self.$field.clear(scope)
            }

            pub fn mark_stale(&self, scope: Option<&::circle_core::ScopeId>) {
                self.$field.mark_stale(scope)
            }

            pub fn state(&self, scope: Option<&::circle_core::ScopeId>) -> $crate::EntryState {
                self.$field.state(scope)
            }

            pub fn cancel_inflight(&self, scope: Option<&::circle_core::ScopeId>) -> bool {
                self.$field.cancel_inflight(scope)
            }

            pub fn debug_records(&self) -> Vec<$crate::ScopeDebugRecord> {
                self.$field.debug_records()
            }
        }
    };
}
