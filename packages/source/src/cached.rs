//! Caching decorator for name-search sources.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use medlocate_cache::{CacheKey, ResponseCache, get_json, set_json};
use medlocate_provider_models::{RawProviderRecord, SourceKind};

use crate::{GLOBAL_COUNTRY, ProviderSource, SourceError, SourceQuery};

/// Default lifetime of a cached name search.
pub const DEFAULT_NAME_SEARCH_TTL: Duration = Duration::from_secs(5 * 60 * 60);

/// Caches the normalized results of name queries.
///
/// Area queries pass straight through. Errors and empty results are never
/// cached, so a transient upstream failure does not stick.
pub struct CachedSource<S> {
    inner: S,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
}

impl<S: ProviderSource> CachedSource<S> {
    /// Wraps `inner` with `cache`.
    pub fn new(inner: S, cache: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

fn cache_key(query: &SourceQuery) -> Option<CacheKey> {
    match query {
        SourceQuery::Name { name, country } => Some(CacheKey::name_search(
            name,
            country.as_deref().unwrap_or(GLOBAL_COUNTRY),
        )),
        SourceQuery::Area { .. } => None,
    }
}

#[async_trait]
impl<S: ProviderSource> ProviderSource for CachedSource<S> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn supports(&self, query: &SourceQuery) -> bool {
        self.inner.supports(query)
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProviderRecord>, SourceError> {
        let Some(key) = cache_key(query) else {
            return self.inner.fetch(query).await;
        };

        if let Some(hit) = get_json::<Vec<RawProviderRecord>>(self.cache.as_ref(), &key).await {
            log::debug!("{}: cache hit for {key}", self.id());
            return Ok(hit);
        }

        let records = self.inner.fetch(query).await?;
        if !records.is_empty() {
            set_json(self.cache.as_ref(), &key, &records, self.ttl).await;
        }
        Ok(records)
    }
}
