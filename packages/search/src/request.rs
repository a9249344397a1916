//! Search request validation and response shapes.

use medlocate_provider_models::{CanonicalProvider, Coordinates};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::SearchError;

/// Longest accepted scope key.
const MAX_SCOPE_LEN: usize = 128;

/// An inbound search. Exactly one of the coordinate pair, `address` or
/// `name` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Origin latitude.
    pub latitude: Option<f64>,
    /// Origin longitude.
    pub longitude: Option<f64>,
    /// Free-text origin address.
    pub address: Option<String>,
    /// Facility name.
    pub name: Option<String>,
    /// Result-set scope. Defaults to [`medlocate_store::DEFAULT_SCOPE`].
    pub scope: Option<String>,
}

/// What a validated request searches by.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCriteria {
    /// Around a coordinate pair.
    Location(Coordinates),
    /// Around a geocoded address.
    Address(String),
    /// By facility name, without a spatial origin.
    Name(String),
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSearch {
    /// Search criteria.
    pub criteria: SearchCriteria,
    /// Result-set scope.
    pub scope: String,
}

impl SearchRequest {
    /// A coordinate search.
    #[must_use]
    pub fn location(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Self::default()
        }
    }

    /// An address search.
    #[must_use]
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    /// A name search.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the result-set scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Checks that exactly one search type is present and well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidInput`] if zero or several search
    /// types are set, a coordinate is given without its pair, coordinates
    /// are out of range, the address or name is blank, or the scope is too
    /// long.
    pub fn validate(&self) -> Result<ValidatedSearch, SearchError> {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            (None, None) => None,
            _ => return Err(invalid("latitude and longitude must be provided together")),
        };

        let present = [
            location.is_some(),
            self.address.is_some(),
            self.name.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();
        if present != 1 {
            return Err(invalid(
                "exactly one of coordinates, address or name must be provided",
            ));
        }

        let criteria = if let Some(point) = location {
            let point = medlocate_geo::validate_coordinates(point)
                .map_err(|e| invalid(&e.to_string()))?;
            SearchCriteria::Location(point)
        } else if let Some(address) = &self.address {
            SearchCriteria::Address(non_blank(address, "address")?)
        } else if let Some(name) = &self.name {
            SearchCriteria::Name(non_blank(name, "name")?)
        } else {
            return Err(invalid("no search criteria"));
        };

        let scope = self
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(medlocate_store::DEFAULT_SCOPE);
        if scope.len() > MAX_SCOPE_LEN {
            return Err(invalid(&format!(
                "scope must be at most {MAX_SCOPE_LEN} bytes"
            )));
        }

        Ok(ValidatedSearch {
            criteria,
            scope: scope.to_string(),
        })
    }
}

fn invalid(message: &str) -> SearchError {
    SearchError::InvalidInput {
        message: message.to_string(),
    }
}

fn non_blank(value: &str, field: &str) -> Result<String, SearchError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(&format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Which kind of search produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SearchType {
    /// Coordinate search.
    Location,
    /// Address search.
    Address,
    /// Name search.
    Name,
}

impl From<&SearchCriteria> for SearchType {
    fn from(criteria: &SearchCriteria) -> Self {
        match criteria {
            SearchCriteria::Location(_) => Self::Location,
            SearchCriteria::Address(_) => Self::Address,
            SearchCriteria::Name(_) => Self::Name,
        }
    }
}

/// The resolved origin of a spatial search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchLocation {
    /// Origin latitude.
    pub latitude: f64,
    /// Origin longitude.
    pub longitude: f64,
    /// Country reported by the geocoder.
    pub country: Option<String>,
    /// Address reported by the geocoder.
    pub formatted_address: Option<String>,
}

/// Summary of a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    /// Number of providers returned.
    pub total_results: usize,
    /// Resolved origin, for location and address searches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_location: Option<SearchLocation>,
    /// Ids of sources that failed or timed out.
    pub failed_sources: Vec<String>,
    /// Scope the results were stored under.
    pub scope: String,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Providers, nearest first for spatial searches.
    pub providers: Vec<CanonicalProvider>,
    /// Kind of search.
    pub search_type: SearchType,
    /// Run summary.
    pub metadata: SearchMetadata,
}

#[cfg(test)]
mod tests {
    use medlocate_provider_models::ErrorKind;

    use super::*;

    fn assert_invalid(request: &SearchRequest) {
        let err = request.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{request:?}");
    }

    #[test]
    fn exactly_one_search_type() {
        assert_invalid(&SearchRequest::default());
        assert_invalid(&SearchRequest {
            address: Some("12 Allen Ave".to_string()),
            name: Some("Reddington".to_string()),
            ..SearchRequest::default()
        });
        assert_invalid(&SearchRequest {
            name: Some("Reddington".to_string()),
            ..SearchRequest::location(6.6, 3.35)
        });
    }

    #[test]
    fn coordinates_come_in_pairs_and_in_range() {
        assert_invalid(&SearchRequest {
            latitude: Some(6.6),
            ..SearchRequest::default()
        });
        assert_invalid(&SearchRequest::location(91.0, 0.0));
        assert_invalid(&SearchRequest::location(0.0, 181.0));
        assert_invalid(&SearchRequest::location(f64::NAN, 0.0));

        let validated = SearchRequest::location(6.6, 3.35).validate().unwrap();
        assert_eq!(
            validated.criteria,
            SearchCriteria::Location(Coordinates::new(6.6, 3.35))
        );
        assert_eq!(validated.scope, "default");
    }

    #[test]
    fn blank_text_is_rejected() {
        assert_invalid(&SearchRequest::address("   "));
        assert_invalid(&SearchRequest::name(""));

        let validated = SearchRequest::name("  Reddington ")
            .with_scope(" session-42 ")
            .validate()
            .unwrap();
        assert_eq!(validated.criteria, SearchCriteria::Name("Reddington".to_string()));
        assert_eq!(validated.scope, "session-42");
    }

    #[test]
    fn oversized_scope_is_rejected() {
        assert_invalid(&SearchRequest::name("Clinic").with_scope("x".repeat(200)));
    }

    #[test]
    fn request_deserializes_from_camel_case_json() {
        let request: SearchRequest =
            serde_json::from_value(serde_json::json!({ "latitude": 6.6, "longitude": 3.35 }))
                .unwrap();
        assert_eq!(request, SearchRequest::location(6.6, 3.35));
    }

    #[test]
    fn search_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(SearchType::Address).unwrap(),
            serde_json::json!("address")
        );
        assert_eq!(SearchType::Name.to_string(), "name");
    }
}
