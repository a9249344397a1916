//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding backend is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`], [`enabled_services`] and [`primary_service`].

use serde::Deserialize;

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"google"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be used.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Preference order, lower values first.
    pub priority: u32,
    /// Backend-specific configuration.
    pub provider: ProviderConfig,
}

/// Backend-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Geocoding API.
    Google {
        /// Endpoint URL.
        base_url: String,
        /// Environment variable holding the API key.
        credential_env: String,
        /// Per-request timeout.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        /// Token-bucket capacity and refill per second.
        #[serde(default = "default_rate_per_sec")]
        rate_per_sec: u32,
    },
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_rate_per_sec() -> u32 {
    50
}

impl GeocodingService {
    /// The backend's endpoint URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Google { base_url, .. } => base_url,
        }
    }

    /// Environment variable the backend's credential is read from.
    #[must_use]
    pub fn credential_env(&self) -> &str {
        match &self.provider {
            ProviderConfig::Google { credential_env, .. } => credential_env,
        }
    }
}

const SERVICE_TOMLS: &[(&str, &str)] = &[("google", include_str!("../services/google.toml"))];

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// The highest-priority enabled service, if any.
#[must_use]
pub fn primary_service() -> Option<GeocodingService> {
    enabled_services().into_iter().next()
}
