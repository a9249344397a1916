//! Production wiring: turns a [`SearchConfig`] into a ready
//! [`SearchOrchestrator`].

use std::sync::Arc;

use medlocate_cache::{MemoryCache, RateLimiter, ResponseCache};
use medlocate_geocoder::{
    CachedGeocoder, Geocoder, GoogleGeocoder, service_registry::ProviderConfig,
};
use medlocate_source::{ProviderSource, cached::CachedSource};
use medlocate_store::{ProviderStore, memory::MemoryProviderStore};

use crate::{
    config::{ConfigError, SearchConfig},
    orchestrator::{SearchOrchestrator, SearchSettings},
};

/// Builds the geocoder, sources and store described by `config`.
///
/// Geocodes and name searches share one response cache. Every source is
/// wrapped in a [`CachedSource`]; only name queries are cached.
///
/// # Errors
///
/// * [`ConfigError::MissingCredential`] if a credential disappeared from
///   `config` after it was loaded
/// * [`ConfigError::Geocode`] or [`ConfigError::Source`] if an HTTP client
///   cannot be built
/// * [`ConfigError::Store`] if the `DuckDB` file cannot be opened
pub fn from_config(config: &SearchConfig) -> Result<SearchOrchestrator, ConfigError> {
    let cache: Arc<dyn ResponseCache> = Arc::new(MemoryCache::new(config.cache_capacity));

    let ProviderConfig::Google { rate_per_sec, .. } = &config.geocoder.provider;
    let rate = config.geocode_rate_per_sec.unwrap_or(*rate_per_sec);
    let limiter = Arc::new(RateLimiter::per_second(rate));

    let env = config.geocoder.credential_env();
    let api_key = config
        .credential(env)
        .ok_or_else(|| ConfigError::MissingCredential {
            service: config.geocoder.id.clone(),
            env: env.to_string(),
        })?;
    let google = GoogleGeocoder::from_service(&config.geocoder, api_key, limiter)?;
    let geocoder: Arc<dyn Geocoder> = Arc::new(CachedGeocoder::new(
        google,
        Arc::clone(&cache),
        config.geocode_cache_ttl,
    ));
    log::info!(
        "Geocoder: {} ({} req/s)",
        config.geocoder.name,
        rate
    );

    let mut sources: Vec<Arc<dyn ProviderSource>> = Vec::with_capacity(config.sources.len());
    for def in &config.sources {
        let credential = def
            .credential_env
            .as_deref()
            .and_then(|env| config.credential(env));
        let source = def.build(credential)?;
        sources.push(Arc::new(CachedSource::new(
            source,
            Arc::clone(&cache),
            config.name_cache_ttl,
        )));
        log::info!("Source enabled: {} ({})", def.name(), def.id());
    }

    let store = open_store(config)?;

    Ok(SearchOrchestrator::new(
        geocoder,
        sources,
        store,
        SearchSettings {
            radius_km: config.search_radius_km,
            adapter_timeout: config.adapter_timeout,
        },
    ))
}

#[cfg(feature = "duckdb")]
fn open_store(config: &SearchConfig) -> Result<Arc<dyn ProviderStore>, ConfigError> {
    if let Some(path) = &config.duckdb_path {
        log::info!("Provider store: DuckDB at {}", path.display());
        let store = medlocate_store::duckdb_store::DuckDbProviderStore::open(path)?;
        return Ok(Arc::new(store));
    }
    log::info!("Provider store: in-memory");
    Ok(Arc::new(MemoryProviderStore::new()))
}

#[cfg(not(feature = "duckdb"))]
#[allow(clippy::unnecessary_wraps)]
fn open_store(config: &SearchConfig) -> Result<Arc<dyn ProviderStore>, ConfigError> {
    if config.duckdb_path.is_some() {
        log::warn!(
            "MEDLOCATE_DUCKDB_PATH is set but this build has no duckdb support; using in-memory storage"
        );
    }
    log::info!("Provider store: in-memory");
    Ok(Arc::new(MemoryProviderStore::new()))
}
