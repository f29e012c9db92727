//! Resource and loader traits.

use async_trait::async_trait;
use circle_core::{CircleResult, ScopeId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

/// A value a [`ResourceStore`](crate::ResourceStore) can cache.
///
/// Serde bounds let the inspector capture and edit cached values.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Resource for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Loads a resource for a cache partition.
///
/// Implementations see the scope being fetched; account-scoped stores pass
/// the account id, global stores always pass `None`.
#[async_trait]
pub trait ResourceLoader<T>: Send + Sync {
    async fn load(&self, scope: &ScopeId) -> CircleResult<T>;
}

/// Adapter turning an async closure into a [`ResourceLoader`].
pub struct FnLoader<F> {
    load: F,
}

impl<F> FnLoader<F> {
    pub fn new(load: F) -> Self {
        Self { load }
    }
}

#[async_trait]
impl<T, F, Fut> ResourceLoader<T> for FnLoader<F>
where
    T: Send + 'static,
    F: Fn(ScopeId) -> Fut + Send + Sync,
    Fut: Future<Output = CircleResult<T>> + Send + 'static,
{
    async fn load(&self, scope: &ScopeId) -> CircleResult<T> {
        (self.load)(scope.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circle_core::AccountId;

    #[tokio::test]
    async fn test_fn_loader_receives_scope() {
        let loader = FnLoader::new(|scope: ScopeId| async move {
            Ok::<_, circle_core::CircleError>(scope.map(AccountId::into_inner).unwrap_or_default())
        });

        let value = loader.load(&Some(AccountId::from("usr_a"))).await.unwrap();
        assert_eq!(value, "usr_a");
        assert_eq!(loader.load(&None).await.unwrap(), "");
    }
}
