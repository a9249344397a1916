//! Keyword and attribute filtering over stored providers.

use std::str::FromStr as _;

use chrono::{DateTime, Datelike as _, NaiveTime, TimeZone, Timelike as _};
use medlocate_provider_models::{
    CanonicalProvider, Coordinates, InstitutionType, OwnershipType, Weekday,
};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::StoreError;

/// Largest accepted `max_distance_km`.
pub const MAX_FILTER_DISTANCE_KM: f64 = 10.0;

/// Compiled regexes larger than this are rejected.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// A weekday and wall-clock time to evaluate "open now" against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenAt {
    /// Day of the week.
    pub day: Weekday,
    /// Local time of day.
    pub time: NaiveTime,
}

impl OpenAt {
    /// Parses a weekday name (`"monday"`) and an `HH:MM` time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] if either part is malformed.
    pub fn parse(day: &str, time: &str) -> Result<Self, StoreError> {
        let day = Weekday::from_str(day.trim()).map_err(|_| StoreError::InvalidFilter {
            message: format!("Unknown weekday '{day}'"),
        })?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| {
            StoreError::InvalidFilter {
                message: format!("Time '{time}' is not in HH:MM format"),
            }
        })?;
        Ok(Self { day, time })
    }

    /// The weekday and minute of `instant` in its own time zone.
    #[must_use]
    pub fn from_datetime<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        let time = instant.time();
        Self {
            day: instant.weekday().into(),
            time: NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time),
        }
    }
}

/// Criteria for the keyword-filter query path. All set criteria must hold.
#[derive(Debug, Clone, Default)]
pub struct ProviderFilter {
    /// Case-insensitive regex matched against name, alternate names, city,
    /// country and specialties.
    pub keyword: Option<String>,
    /// Exact institution type.
    pub institution_type: Option<InstitutionType>,
    /// Exact ownership type.
    pub ownership_type: Option<OwnershipType>,
    /// Specialty, case-insensitive substring.
    pub specialty: Option<String>,
    /// Spoken language, case-insensitive.
    pub language: Option<String>,
    /// Only facilities known to have emergency services.
    pub emergency_only: bool,
    /// Only facilities open at this moment.
    pub open_at: Option<OpenAt>,
    /// Reference point for distance ranking.
    pub origin: Option<Coordinates>,
    /// Maximum distance from `origin`, in `(0, 10]` km.
    pub max_distance_km: Option<f64>,
}

/// A provider that passed a filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMatch {
    /// The provider.
    pub provider: CanonicalProvider,
    /// Distance from the filter origin, when one was given.
    pub distance_km: Option<f64>,
}

/// A validated [`ProviderFilter`].
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    keyword: Option<Regex>,
    institution_type: Option<InstitutionType>,
    ownership_type: Option<OwnershipType>,
    specialty: Option<String>,
    language: Option<String>,
    emergency_only: bool,
    open_at: Option<OpenAt>,
    origin: Option<Coordinates>,
    max_distance_km: f64,
}

impl ProviderFilter {
    /// Validates the filter and compiles its keyword.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] if the keyword is not a valid
    /// regex, the origin is out of range, or `max_distance_km` is outside
    /// `(0, 10]` or given without an origin.
    pub fn compile(&self) -> Result<CompiledFilter, StoreError> {
        let keyword = self
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| {
                RegexBuilder::new(k)
                    .case_insensitive(true)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .map_err(|e| StoreError::InvalidFilter {
                        message: format!("Invalid keyword pattern: {e}"),
                    })
            })
            .transpose()?;

        let origin = self
            .origin
            .map(medlocate_geo::validate_coordinates)
            .transpose()
            .map_err(|e| StoreError::InvalidFilter {
                message: e.to_string(),
            })?;

        let max_distance_km = match (self.max_distance_km, origin) {
            (Some(max), Some(_)) if max > 0.0 && max <= MAX_FILTER_DISTANCE_KM => max,
            (Some(max), Some(_)) => {
                return Err(StoreError::InvalidFilter {
                    message: format!(
                        "maxDistanceKm must be in (0, {MAX_FILTER_DISTANCE_KM}], got {max}"
                    ),
                });
            }
            (Some(_), None) => {
                return Err(StoreError::InvalidFilter {
                    message: "maxDistanceKm requires an origin".to_string(),
                });
            }
            (None, _) => f64::INFINITY,
        };

        Ok(CompiledFilter {
            keyword,
            institution_type: self.institution_type,
            ownership_type: self.ownership_type,
            specialty: lowered(self.specialty.as_deref()),
            language: lowered(self.language.as_deref()),
            emergency_only: self.emergency_only,
            open_at: self.open_at,
            origin,
            max_distance_km,
        })
    }
}

fn lowered(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

impl CompiledFilter {
    /// Whether `provider` satisfies every non-spatial criterion.
    #[must_use]
    pub fn matches(&self, provider: &CanonicalProvider) -> bool {
        if let Some(keyword) = &self.keyword {
            let address = &provider.location.address;
            let hit = std::iter::once(&provider.name)
                .chain(&provider.alternate_names)
                .chain(address.city.as_ref())
                .chain(address.country.as_ref())
                .chain(&provider.service_capabilities.specialties)
                .any(|text| keyword.is_match(text));
            if !hit {
                return false;
            }
        }

        if self
            .institution_type
            .is_some_and(|t| t != provider.institution_type)
            || self
                .ownership_type
                .is_some_and(|t| t != provider.ownership_type)
        {
            return false;
        }

        let capabilities = &provider.service_capabilities;
        let specialty_ok = self.specialty.as_ref().is_none_or(|specialty| {
            capabilities
                .specialties
                .iter()
                .any(|s| s.to_lowercase().contains(specialty.as_str()))
        });
        let language_ok = self.language.as_ref().is_none_or(|language| {
            capabilities
                .languages
                .iter()
                .any(|l| l.to_lowercase() == *language)
        });
        if !specialty_ok || !language_ok {
            return false;
        }
        if self.emergency_only && capabilities.emergency_services != Some(true) {
            return false;
        }

        self.open_at
            .is_none_or(|at| provider.is_open_at(at.day, at.time))
    }

    /// Keeps matching providers. With an origin, also drops providers
    /// beyond the distance limit and sorts by distance.
    #[must_use]
    pub fn apply(&self, providers: Vec<CanonicalProvider>) -> Vec<ProviderMatch> {
        let matching = providers.into_iter().filter(|p| self.matches(p));

        match self.origin {
            Some(origin) => medlocate_geo::filter_by_distance(origin, matching, self.max_distance_km)
                .into_iter()
                .map(|ranked| ProviderMatch {
                    provider: ranked.item,
                    distance_km: Some(ranked.distance_km),
                })
                .collect(),
            None => matching
                .map(|provider| ProviderMatch {
                    provider,
                    distance_km: None,
                })
                .collect(),
        }
    }
}
