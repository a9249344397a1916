//! HTTP handler functions for the medlocate API.

use std::str::FromStr as _;

use actix_web::{
    HttpRequest, HttpResponse,
    error::{InternalError, JsonPayloadError, QueryPayloadError},
    http::StatusCode,
    web,
};
use medlocate_provider_models::{Coordinates, ErrorKind, InstitutionType, OwnershipType};
use medlocate_search::{SearchError, SearchRequest};
use medlocate_server_models::{
    ApiHealth, ApiResponse, GeocodeBody, ProviderQueryParams, ReverseGeocodeParams, ScopeParams,
};
use medlocate_store::{DEFAULT_SCOPE, OpenAt, ProviderFilter};
use serde::Serialize;

use crate::AppState;

/// HTTP status for an engine error kind.
const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(data))
}

fn error_response(err: &SearchError) -> HttpResponse {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        log::error!("{err}");
    } else {
        log::debug!("{kind}: {err}");
    }
    HttpResponse::build(status).json(ApiResponse::<()>::err(kind, err.to_string()))
}

fn respond<T: Serialize>(result: Result<T, SearchError>) -> HttpResponse {
    match result {
        Ok(data) => ok(data),
        Err(e) => error_response(&e),
    }
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::<()>::err(ErrorKind::InvalidInput, message))
}

/// Replaces actix's plain-text body errors with an [`ApiResponse`].
pub fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = bad_request(format!("Invalid request body: {err}"));
    InternalError::from_response(err, response).into()
}

/// Replaces actix's plain-text query errors with an [`ApiResponse`].
pub fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = bad_request(format!("Invalid query string: {err}"));
    InternalError::from_response(err, response).into()
}

fn scope_of(scope: Option<&str>) -> &str {
    scope
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SCOPE)
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        sources: state
            .engine
            .source_ids()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

/// `POST /api/search`
///
/// Runs a location, address or name search and returns the merged
/// providers with run metadata.
pub async fn search(
    state: web::Data<AppState>,
    body: web::Json<SearchRequest>,
) -> HttpResponse {
    respond(state.engine.search(&body).await)
}

/// `POST /api/geocode`
pub async fn geocode(state: web::Data<AppState>, body: web::Json<GeocodeBody>) -> HttpResponse {
    respond(state.engine.geocode_address(&body.address).await)
}

/// `GET /api/reverse-geocode?lat=..&lon=..`
pub async fn reverse_geocode(
    state: web::Data<AppState>,
    params: web::Query<ReverseGeocodeParams>,
) -> HttpResponse {
    respond(state.engine.reverse_geocode(params.lat, params.lon).await)
}

/// `GET /api/providers`
///
/// Filters the providers stored by earlier searches in a scope.
pub async fn providers(
    state: web::Data<AppState>,
    params: web::Query<ProviderQueryParams>,
) -> HttpResponse {
    let filter = match provider_filter(&params) {
        Ok(filter) => filter,
        Err(e) => return error_response(&e),
    };
    let scope = scope_of(params.scope.as_deref());
    respond(state.engine.filter_providers(scope, &filter).await)
}

/// `GET /api/providers/{unique_id}`
pub async fn provider(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<ScopeParams>,
) -> HttpResponse {
    let scope = scope_of(params.scope.as_deref());
    respond(state.engine.provider(scope, &path).await)
}

fn invalid(message: String) -> SearchError {
    SearchError::InvalidInput { message }
}

/// Converts query parameters to a [`ProviderFilter`].
fn provider_filter(params: &ProviderQueryParams) -> Result<ProviderFilter, SearchError> {
    let institution_type = params
        .institution_type
        .as_deref()
        .map(|raw| {
            InstitutionType::from_str(raw.trim())
                .map_err(|_| invalid(format!("Unknown institution type '{raw}'")))
        })
        .transpose()?;
    let ownership_type = params
        .ownership_type
        .as_deref()
        .map(|raw| {
            OwnershipType::from_str(raw.trim())
                .map_err(|_| invalid(format!("Unknown ownership type '{raw}'")))
        })
        .transpose()?;

    let open_at = if params.open_now == Some(true) {
        Some(OpenAt::from_datetime(&chrono::Local::now()))
    } else {
        match (&params.open_day, &params.open_time) {
            (Some(day), Some(time)) => Some(OpenAt::parse(day, time)?),
            (None, None) => None,
            _ => {
                return Err(invalid(
                    "openDay and openTime must be provided together".to_string(),
                ));
            }
        }
    };

    let origin = match (params.lat, params.lon) {
        (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
        (None, None) => None,
        _ => {
            return Err(invalid(
                "lat and lon must be provided together".to_string(),
            ));
        }
    };

    Ok(ProviderFilter {
        keyword: params.keyword.clone(),
        institution_type,
        ownership_type,
        specialty: params.specialty.clone(),
        language: params.language.clone(),
        emergency_only: params.emergency_only.unwrap_or(false),
        open_at,
        origin,
        max_distance_km: params.max_distance_km,
    })
}
