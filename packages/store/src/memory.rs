//! In-process provider store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use medlocate_provider_models::CanonicalProvider;
use tokio::sync::RwLock;

use crate::{ProviderStore, StoreError};

type Scope = BTreeMap<String, CanonicalProvider>;

/// Scoped provider maps behind a [`RwLock`]. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryProviderStore {
    scopes: RwLock<BTreeMap<String, Scope>>,
}

impl MemoryProviderStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProviderStore for MemoryProviderStore {
    async fn clear_scope(&self, scope: &str) -> Result<usize, StoreError> {
        let removed = self.scopes.write().await.remove(scope);
        Ok(removed.map_or(0, |s| s.len()))
    }

    async fn upsert_many(
        &self,
        scope: &str,
        providers: &[CanonicalProvider],
    ) -> Result<usize, StoreError> {
        let mut scopes = self.scopes.write().await;
        let entries = scopes.entry(scope.to_string()).or_default();
        for provider in providers {
            entries.insert(provider.unique_id.clone(), provider.clone());
        }
        Ok(providers.len())
    }

    async fn replace_scope(
        &self,
        scope: &str,
        providers: &[CanonicalProvider],
    ) -> Result<usize, StoreError> {
        let entries = providers
            .iter()
            .map(|p| (p.unique_id.clone(), p.clone()))
            .collect::<Scope>();
        self.scopes.write().await.insert(scope.to_string(), entries);
        Ok(providers.len())
    }

    async fn get(
        &self,
        scope: &str,
        unique_id: &str,
    ) -> Result<Option<CanonicalProvider>, StoreError> {
        Ok(self
            .scopes
            .read()
            .await
            .get(scope)
            .and_then(|s| s.get(unique_id))
            .cloned())
    }

    async fn list(&self, scope: &str) -> Result<Vec<CanonicalProvider>, StoreError> {
        Ok(self
            .scopes
            .read()
            .await
            .get(scope)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default())
    }
}
