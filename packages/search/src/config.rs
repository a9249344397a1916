//! Runtime configuration read from the environment.
//!
//! Numeric settings fall back to their defaults when unset or unparseable.
//! Credentials are resolved once here; a missing credential for an enabled
//! service is a startup error, never a per-request one.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use medlocate_geocoder::service_registry::{self, GeocodingService};
use medlocate_source::{SourceError, registry, source_def::SourceDefinition};
use medlocate_store::StoreError;

/// Default search radius around the resolved origin.
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 10.0;
/// Default per-adapter time budget.
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 30;
/// Default lifetime of cached geocodes (24 h).
pub const DEFAULT_GEOCODE_CACHE_TTL_SECS: u64 = 86_400;
/// Default lifetime of cached name searches (5 h).
pub const DEFAULT_NAME_CACHE_TTL_SECS: u64 = 18_000;

/// Errors raised while assembling the runtime.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An enabled service needs a credential that is not set.
    #[error("Service '{service}' requires environment variable {env}")]
    MissingCredential {
        /// Service id.
        service: String,
        /// Environment variable that should hold the credential.
        env: String,
    },

    /// No geocoding service is enabled.
    #[error("No geocoding service is enabled")]
    NoGeocoder,

    /// A source could not be instantiated.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The geocoder could not be instantiated.
    #[error("Geocoder error: {0}")]
    Geocode(#[from] medlocate_geocoder::GeocodeError),

    /// The provider store could not be opened.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Everything needed to build a search engine.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Radius around the origin for location and address searches.
    pub search_radius_km: f64,
    /// Upper bound on each adapter's fetch.
    pub adapter_timeout: Duration,
    /// Geocoder token-bucket capacity and refill per second. Overrides the
    /// registry value when set.
    pub geocode_rate_per_sec: Option<u32>,
    /// Lifetime of cached geocodes.
    pub geocode_cache_ttl: Duration,
    /// Lifetime of cached name searches.
    pub name_cache_ttl: Duration,
    /// Maximum cached responses.
    pub cache_capacity: u64,
    /// Geocoding backend.
    pub geocoder: GeocodingService,
    /// Enabled sources, by priority.
    pub sources: Vec<SourceDefinition>,
    /// Credential values keyed by environment variable name.
    pub credentials: BTreeMap<String, String>,
    /// `DuckDB` file for persistent storage. In-memory storage when `None`.
    pub duckdb_path: Option<PathBuf>,
}

impl SearchConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::NoGeocoder`] if no geocoding service is enabled
    /// * [`ConfigError::MissingCredential`] if an enabled service lacks its
    ///   credential
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`SearchConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let disabled = var("MEDLOCATE_DISABLED_SOURCES")
            .map(|v| {
                v.split(',')
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let sources = registry::enabled_sources()
            .into_iter()
            .filter(|s| !disabled.iter().any(|d| d == s.id()))
            .collect::<Vec<_>>();
        let geocoder = service_registry::primary_service().ok_or(ConfigError::NoGeocoder)?;

        let mut credentials = BTreeMap::new();
        let required = std::iter::once((geocoder.id.as_str(), geocoder.credential_env())).chain(
            sources
                .iter()
                .filter_map(|s| s.credential_env.as_deref().map(|env| (s.id(), env))),
        );
        for (service, env) in required {
            let value = var(env).ok_or_else(|| ConfigError::MissingCredential {
                service: service.to_string(),
                env: env.to_string(),
            })?;
            credentials.insert(env.to_string(), value);
        }

        Ok(Self {
            search_radius_km: parse_or(&var, "MEDLOCATE_SEARCH_RADIUS_KM", DEFAULT_SEARCH_RADIUS_KM),
            adapter_timeout: Duration::from_secs(parse_or(
                &var,
                "MEDLOCATE_ADAPTER_TIMEOUT_SECS",
                DEFAULT_ADAPTER_TIMEOUT_SECS,
            )),
            geocode_rate_per_sec: var("MEDLOCATE_GEOCODE_RATE_PER_SEC").and_then(|v| v.parse().ok()),
            geocode_cache_ttl: Duration::from_secs(parse_or(
                &var,
                "MEDLOCATE_GEOCODE_CACHE_TTL_SECS",
                DEFAULT_GEOCODE_CACHE_TTL_SECS,
            )),
            name_cache_ttl: Duration::from_secs(parse_or(
                &var,
                "MEDLOCATE_NAME_CACHE_TTL_SECS",
                DEFAULT_NAME_CACHE_TTL_SECS,
            )),
            cache_capacity: parse_or(
                &var,
                "MEDLOCATE_CACHE_CAPACITY",
                medlocate_cache::DEFAULT_CAPACITY,
            ),
            geocoder,
            sources,
            credentials,
            duckdb_path: var("MEDLOCATE_DUCKDB_PATH").map(PathBuf::from),
        })
    }

    /// The credential stored for `env`, if any.
    #[must_use]
    pub fn credential(&self, env: &str) -> Option<String> {
        self.credentials.get(env).cloned()
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparseable {name}={raw}");
            default
        }),
        None => default,
    }
}
