//! The search state machine.
//!
//! ```text
//! Idle -> Validating -> Resolving -> Fetching -> Merging -> RankingAndFiltering -> Persisting -> Done
//!                   \_____________/                     \______________________/
//!                    name searches                        name searches
//! ```
//!
//! Any step may end in `Failed`. Validation runs before any external call.
//! Source failures are contained: they are logged and reported in
//! `failedSources`, never returned as errors.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use futures::future::join_all;
use medlocate_geocoder::{GeocodedAddress, Geocoder, ReverseGeocodedAddress};
use medlocate_provider_models::{CanonicalProvider, Coordinates, RawProviderRecord};
use medlocate_resolver::validation::assess_canonical;
use medlocate_source::{ProviderSource, SourceQuery, fetch_with_timeout};
use medlocate_store::{ProviderFilter, ProviderMatch, ProviderStore, StoreError};
use strum_macros::Display;

use crate::{
    SearchError,
    config::{DEFAULT_ADAPTER_TIMEOUT_SECS, DEFAULT_SEARCH_RADIUS_KM},
    request::{
        SearchCriteria, SearchLocation, SearchMetadata, SearchRequest, SearchResponse, SearchType,
        ValidatedSearch,
    },
};

/// Steps of a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SearchPhase {
    /// Not started.
    Idle,
    /// Checking the request.
    Validating,
    /// Geocoding the origin.
    Resolving,
    /// Querying sources.
    Fetching,
    /// Deduplicating records.
    Merging,
    /// Applying the distance filter.
    RankingAndFiltering,
    /// Writing to the store.
    Persisting,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl SearchPhase {
    /// Whether the machine may move from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Done | Self::Failed, _) => false,
            (_, Self::Failed) => true,
            (Self::Idle, Self::Validating)
            | (Self::Validating, Self::Resolving | Self::Fetching)
            | (Self::Resolving, Self::Fetching)
            | (Self::Fetching, Self::Merging)
            | (Self::Merging, Self::RankingAndFiltering | Self::Persisting)
            | (Self::RankingAndFiltering, Self::Persisting)
            | (Self::Persisting, Self::Done) => true,
            _ => false,
        }
    }
}

/// Logs phase transitions for one run.
struct PhaseTracker {
    id: u64,
    phase: SearchPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            phase: SearchPhase::Idle,
        }
    }

    fn advance(&mut self, next: SearchPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.phase
        );
        log::debug!("search #{}: {} -> {next}", self.id, self.phase);
        self.phase = next;
    }

    fn fail(&mut self, error: &SearchError) {
        log::warn!("search #{} failed during {}: {error}", self.id, self.phase);
        self.advance(SearchPhase::Failed);
    }
}

/// Tunables for a search run.
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    /// Radius around the origin for spatial searches.
    pub radius_km: f64,
    /// Upper bound on each source fetch.
    pub adapter_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_SEARCH_RADIUS_KM,
            adapter_timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
        }
    }
}

/// One async mutex per scope, so clear-then-write on a scope is exclusive.
#[derive(Debug, Default)]
struct ScopeLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ScopeLocks {
    fn get(&self, scope: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody holds any more.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(scope.to_string()).or_default())
    }
}

/// Drives searches against a geocoder, a set of sources and a store.
pub struct SearchOrchestrator {
    geocoder: Arc<dyn Geocoder>,
    sources: Vec<Arc<dyn ProviderSource>>,
    store: Arc<dyn ProviderStore>,
    settings: SearchSettings,
    scope_locks: ScopeLocks,
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("sources", &self.source_ids())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SearchOrchestrator {
    /// Creates an orchestrator. `sources` are fanned out in the given order.
    #[must_use]
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        sources: Vec<Arc<dyn ProviderSource>>,
        store: Arc<dyn ProviderStore>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            geocoder,
            sources,
            store,
            settings,
            scope_locks: ScopeLocks::default(),
        }
    }

    /// Ids of the configured sources.
    #[must_use]
    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Runs one search.
    ///
    /// # Errors
    ///
    /// * [`SearchError::InvalidInput`] if the request fails validation
    /// * [`SearchError::Geocode`] if the origin cannot be geocoded
    /// * [`SearchError::Store`] if persisting the results fails
    ///
    /// Source failures are never errors; see [`SearchMetadata::failed_sources`].
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let mut phases = PhaseTracker::new();
        let result = self.run(request, &mut phases).await;
        match &result {
            Ok(response) => {
                phases.advance(SearchPhase::Done);
                log::info!(
                    "{} search in scope {} returned {} providers",
                    response.search_type,
                    response.metadata.scope,
                    response.metadata.total_results
                );
            }
            Err(e) => phases.fail(e),
        }
        result
    }

    async fn run(
        &self,
        request: &SearchRequest,
        phases: &mut PhaseTracker,
    ) -> Result<SearchResponse, SearchError> {
        phases.advance(SearchPhase::Validating);
        let ValidatedSearch { criteria, scope } = request.validate()?;
        let search_type = SearchType::from(&criteria);

        let (query, location) = match criteria {
            SearchCriteria::Location(point) => {
                phases.advance(SearchPhase::Resolving);
                let reverse = self.geocoder.reverse_geocode(point).await?;
                (
                    self.area_query(point, reverse.country.clone()),
                    Some(SearchLocation {
                        latitude: point.latitude,
                        longitude: point.longitude,
                        country: reverse.country,
                        formatted_address: Some(reverse.formatted_address),
                    }),
                )
            }
            SearchCriteria::Address(address) => {
                phases.advance(SearchPhase::Resolving);
                let geocoded = self.geocoder.geocode_address(&address).await?;
                (
                    self.area_query(geocoded.coordinates(), geocoded.country.clone()),
                    Some(SearchLocation {
                        latitude: geocoded.latitude,
                        longitude: geocoded.longitude,
                        country: geocoded.country,
                        formatted_address: Some(geocoded.formatted_address),
                    }),
                )
            }
            SearchCriteria::Name(name) => (
                SourceQuery::Name {
                    name,
                    country: None,
                },
                None,
            ),
        };

        phases.advance(SearchPhase::Fetching);
        let (records, failed_sources) = self.fetch_all(&query).await;

        phases.advance(SearchPhase::Merging);
        let mut providers = medlocate_resolver::resolve(records, Utc::now());
        for provider in &providers {
            log::debug!(
                "{} ({}): {:?}",
                provider.unique_id,
                provider.name,
                assess_canonical(provider)
            );
        }

        if let Some(origin) = &location {
            phases.advance(SearchPhase::RankingAndFiltering);
            let origin = Coordinates::new(origin.latitude, origin.longitude);
            providers =
                medlocate_geo::filter_by_distance(origin, providers, self.settings.radius_km)
                    .into_iter()
                    .map(|ranked| ranked.item)
                    .collect();
        }

        phases.advance(SearchPhase::Persisting);
        // Spatial searches replace their scope; name searches add to it.
        let replace = search_type != SearchType::Name;
        self.persist(&scope, replace, &providers).await?;

        Ok(SearchResponse {
            metadata: SearchMetadata {
                total_results: providers.len(),
                search_location: location,
                failed_sources,
                scope,
            },
            providers,
            search_type,
        })
    }

    const fn area_query(&self, center: Coordinates, country: Option<String>) -> SourceQuery {
        SourceQuery::Area {
            center,
            radius_km: self.settings.radius_km,
            country,
        }
    }

    /// Fans out to every source supporting `query` and waits for all of
    /// them. Returns the collected records and the ids of failed sources.
    async fn fetch_all(&self, query: &SourceQuery) -> (Vec<RawProviderRecord>, Vec<String>) {
        let timeout = self.settings.adapter_timeout;
        let fetches = self
            .sources
            .iter()
            .filter(|source| source.supports(query))
            .map(|source| async move {
                let result = fetch_with_timeout(source.as_ref(), query, timeout).await;
                (source.id().to_string(), result)
            })
            .collect::<Vec<_>>();

        if fetches.is_empty() {
            log::warn!("No configured source supports this query");
        }

        let mut records = Vec::new();
        let mut failed = Vec::new();
        for (id, result) in join_all(fetches).await {
            match result {
                Ok(batch) => {
                    log::debug!("{id}: {} records", batch.len());
                    records.extend(batch);
                }
                Err(e) => {
                    log::warn!("Source {id} failed ({}): {e}", e.kind());
                    failed.push(id);
                }
            }
        }
        (records, failed)
    }

    /// Writes `providers` to `scope`, clearing it first when `replace`.
    ///
    /// The write runs as its own task while holding the scope lock, so a
    /// caller that goes away mid-write cannot leave the scope cleared but
    /// not yet refilled.
    async fn persist(
        &self,
        scope: &str,
        replace: bool,
        providers: &[CanonicalProvider],
    ) -> Result<(), SearchError> {
        let lock = self.scope_locks.get(scope);
        let store = Arc::clone(&self.store);
        let scope = scope.to_string();
        let providers = providers.to_vec();

        let task = tokio::spawn(async move {
            let _guard = lock.lock().await;
            let written = if replace {
                store.replace_scope(&scope, &providers).await?
            } else {
                store.upsert_many(&scope, &providers).await?
            };
            log::debug!("Persisted {written} providers to scope {scope}");
            Ok::<_, StoreError>(())
        });

        task.await.map_err(|e| SearchError::Internal {
            message: format!("persist task failed: {e}"),
        })??;
        Ok(())
    }

    /// Forward-geocodes `address` without searching.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Geocode`] on any geocoding failure.
    pub async fn geocode_address(&self, address: &str) -> Result<GeocodedAddress, SearchError> {
        Ok(self.geocoder.geocode_address(address).await?)
    }

    /// Reverse-geocodes a coordinate pair without searching.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Geocode`] on any geocoding failure, including
    /// out-of-range coordinates.
    pub async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<ReverseGeocodedAddress, SearchError> {
        Ok(self
            .geocoder
            .reverse_geocode(Coordinates::new(latitude, longitude))
            .await?)
    }

    /// Stored providers in `scope` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Store`] for an invalid filter or a store
    /// failure.
    pub async fn filter_providers(
        &self,
        scope: &str,
        filter: &ProviderFilter,
    ) -> Result<Vec<ProviderMatch>, SearchError> {
        Ok(self.store.filter(scope, filter).await?)
    }

    /// One stored provider.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ProviderNotFound`] if `unique_id` is not in
    /// `scope`, or [`SearchError::Store`] on a store failure.
    pub async fn provider(
        &self,
        scope: &str,
        unique_id: &str,
    ) -> Result<CanonicalProvider, SearchError> {
        self.store
            .get(scope, unique_id)
            .await?
            .ok_or_else(|| SearchError::ProviderNotFound {
                unique_id: unique_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use medlocate_geocoder::GeocodeError;
    use medlocate_provider_models::{ErrorKind, SourceKind};
    use medlocate_source::SourceError;
    use medlocate_store::memory::MemoryProviderStore;

    use super::*;

    const IKEJA: Coordinates = Coordinates::new(6.60, 3.35);

    #[derive(Default)]
    struct FakeGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode_address(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.contains("nowhere") {
                return Err(GeocodeError::NotFound {
                    query: address.to_string(),
                });
            }
            Ok(GeocodedAddress {
                latitude: IKEJA.latitude,
                longitude: IKEJA.longitude,
                formatted_address: "Ikeja, Lagos, Nigeria".to_string(),
                country: Some("Nigeria".to_string()),
                place_id: None,
            })
        }

        async fn reverse_geocode(
            &self,
            _point: Coordinates,
        ) -> Result<ReverseGeocodedAddress, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ReverseGeocodedAddress {
                country: Some("Nigeria".to_string()),
                formatted_address: "Ikeja, Lagos, Nigeria".to_string(),
                place_id: None,
            })
        }
    }

    struct FakeSource {
        id: &'static str,
        kind: SourceKind,
        records: Vec<RawProviderRecord>,
        name_only: bool,
        fail: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(id: &'static str, kind: SourceKind, records: Vec<RawProviderRecord>) -> Self {
            Self {
                id,
                kind,
                records,
                name_only: false,
                fail: false,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderSource for FakeSource {
        fn id(&self) -> &str {
            self.id
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn supports(&self, query: &SourceQuery) -> bool {
            query.is_name() == self.name_only
        }

        async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawProviderRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SourceError::Status {
                    status: 502,
                    url: "http://upstream.test".to_string(),
                });
            }
            Ok(self.records.clone())
        }
    }

    fn record(kind: SourceKind, id: &str, name: &str, lat: f64, lon: f64) -> RawProviderRecord {
        RawProviderRecord::new(kind, id, name, Coordinates::new(lat, lon))
    }

    struct Harness {
        geocoder: Arc<FakeGeocoder>,
        sources: Vec<Arc<FakeSource>>,
        store: Arc<MemoryProviderStore>,
        orchestrator: SearchOrchestrator,
    }

    fn harness(sources: Vec<FakeSource>) -> Harness {
        harness_with(sources, SearchSettings::default())
    }

    fn harness_with(sources: Vec<FakeSource>, settings: SearchSettings) -> Harness {
        let geocoder = Arc::new(FakeGeocoder::default());
        let sources = sources.into_iter().map(Arc::new).collect::<Vec<_>>();
        let store = Arc::new(MemoryProviderStore::new());
        let orchestrator = SearchOrchestrator::new(
            Arc::clone(&geocoder) as Arc<dyn Geocoder>,
            sources
                .iter()
                .map(|s| Arc::clone(s) as Arc<dyn ProviderSource>)
                .collect(),
            Arc::clone(&store) as Arc<dyn ProviderStore>,
            settings,
        );
        Harness {
            geocoder,
            sources,
            store,
            orchestrator,
        }
    }

    /// Memory store whose scope replacement is a slow clear-then-upsert and
    /// whose writes can be made to fail.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryProviderStore,
        write_delay: Option<Duration>,
        fail_writes: AtomicBool,
    }

    impl SlowStore {
        fn check_writable(&self) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::from(
                    serde_json::from_str::<u8>("disk full").unwrap_err(),
                ));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProviderStore for SlowStore {
        async fn clear_scope(&self, scope: &str) -> Result<usize, StoreError> {
            self.check_writable()?;
            self.inner.clear_scope(scope).await
        }

        async fn upsert_many(
            &self,
            scope: &str,
            providers: &[CanonicalProvider],
        ) -> Result<usize, StoreError> {
            self.check_writable()?;
            self.inner.upsert_many(scope, providers).await
        }

        async fn replace_scope(
            &self,
            scope: &str,
            providers: &[CanonicalProvider],
        ) -> Result<usize, StoreError> {
            self.check_writable()?;
            self.inner.clear_scope(scope).await?;
            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.upsert_many(scope, providers).await
        }

        async fn get(
            &self,
            scope: &str,
            unique_id: &str,
        ) -> Result<Option<CanonicalProvider>, StoreError> {
            self.inner.get(scope, unique_id).await
        }

        async fn list(&self, scope: &str) -> Result<Vec<CanonicalProvider>, StoreError> {
            self.inner.list(scope).await
        }
    }

    fn orchestrator_over(store: &Arc<SlowStore>, sources: Vec<FakeSource>) -> SearchOrchestrator {
        SearchOrchestrator::new(
            Arc::new(FakeGeocoder::default()),
            sources
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn ProviderSource>)
                .collect(),
            Arc::clone(store) as Arc<dyn ProviderStore>,
            SearchSettings::default(),
        )
    }

    #[tokio::test]
    async fn location_search_merges_same_facility_across_sources() {
        let h = harness(vec![
            FakeSource::new(
                "overpass",
                SourceKind::OpenStreetMap,
                vec![record(SourceKind::OpenStreetMap, "node-1", "Ikeja General Hospital", 6.6012, 3.3515)],
            ),
            FakeSource::new(
                "foursquare",
                SourceKind::Foursquare,
                vec![record(SourceKind::Foursquare, "fsq-1", "Ikeja General Hospital", 6.6012, 3.3515)],
            ),
        ]);

        let response = h
            .orchestrator
            .search(&SearchRequest::location(6.60, 3.35))
            .await
            .unwrap();

        assert_eq!(response.search_type, SearchType::Location);
        assert_eq!(response.providers.len(), 1);
        let provider = &response.providers[0];
        assert!(provider.source_apis.contains(&SourceKind::OpenStreetMap));
        assert!(provider.source_apis.contains(&SourceKind::Foursquare));
        assert_eq!(response.metadata.total_results, 1);
        let location = response.metadata.search_location.unwrap();
        assert_eq!(location.country.as_deref(), Some("Nigeria"));
        assert!(response.metadata.failed_sources.is_empty());
    }

    #[tokio::test]
    async fn no_results_is_not_an_error() {
        let h = harness(vec![
            FakeSource::new("overpass", SourceKind::OpenStreetMap, Vec::new()),
            FakeSource::new("foursquare", SourceKind::Foursquare, Vec::new()),
        ]);

        let response = h
            .orchestrator
            .search(&SearchRequest::address("12 Allen Ave, Ikeja"))
            .await
            .unwrap();
        assert!(response.providers.is_empty());
        assert_eq!(response.metadata.total_results, 0);
        assert_eq!(response.search_type, SearchType::Address);
    }

    #[tokio::test]
    async fn partial_source_failure_is_contained() {
        let mut broken = FakeSource::new("foursquare", SourceKind::Foursquare, Vec::new());
        broken.fail = true;
        let h = harness(vec![
            broken,
            FakeSource::new(
                "overpass",
                SourceKind::OpenStreetMap,
                vec![
                    record(SourceKind::OpenStreetMap, "node-1", "Clinic A", 6.601, 3.351),
                    record(SourceKind::OpenStreetMap, "node-2", "Clinic B", 6.602, 3.352),
                    record(SourceKind::OpenStreetMap, "node-3", "Clinic C", 6.603, 3.353),
                ],
            ),
        ]);

        let response = h
            .orchestrator
            .search(&SearchRequest::location(6.60, 3.35))
            .await
            .unwrap();
        assert_eq!(response.providers.len(), 3);
        assert_eq!(response.metadata.failed_sources, vec!["foursquare".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_is_cut_off_by_the_timeout() {
        let mut slow = FakeSource::new(
            "overpass",
            SourceKind::OpenStreetMap,
            vec![record(SourceKind::OpenStreetMap, "node-1", "Late Clinic", 6.601, 3.351)],
        );
        slow.delay = Some(Duration::from_secs(120));
        let h = harness_with(
            vec![
                slow,
                FakeSource::new(
                    "foursquare",
                    SourceKind::Foursquare,
                    vec![record(SourceKind::Foursquare, "fsq-1", "Quick Clinic", 6.601, 3.351)],
                ),
            ],
            SearchSettings {
                adapter_timeout: Duration::from_secs(5),
                ..SearchSettings::default()
            },
        );

        let response = h
            .orchestrator
            .search(&SearchRequest::location(6.60, 3.35))
            .await
            .unwrap();
        assert_eq!(response.providers.len(), 1);
        assert_eq!(response.providers[0].name, "Quick Clinic");
        assert_eq!(response.metadata.failed_sources, vec!["overpass".to_string()]);
    }

    #[tokio::test]
    async fn results_are_distance_filtered_and_sorted() {
        let h = harness(vec![FakeSource::new(
            "overpass",
            SourceKind::OpenStreetMap,
            vec![
                record(SourceKind::OpenStreetMap, "node-far", "Far Clinic", 6.65, 3.35),
                record(SourceKind::OpenStreetMap, "node-near", "Near Clinic", 6.601, 3.35),
                record(SourceKind::OpenStreetMap, "node-abuja", "Abuja Clinic", 9.07, 7.39),
            ],
        )]);

        let response = h
            .orchestrator
            .search(&SearchRequest::location(6.60, 3.35))
            .await
            .unwrap();
        let names = response
            .providers
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Near Clinic", "Far Clinic"]);
    }

    #[tokio::test]
    async fn invalid_request_makes_no_external_calls() {
        let h = harness(vec![FakeSource::new(
            "overpass",
            SourceKind::OpenStreetMap,
            Vec::new(),
        )]);

        let request = SearchRequest {
            address: Some("12 Allen Ave".to_string()),
            name: Some("Reddington".to_string()),
            ..SearchRequest::default()
        };
        let err = h.orchestrator.search(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = h
            .orchestrator
            .search(&SearchRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.sources[0].calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn geocoding_failure_escalates() {
        let h = harness(vec![FakeSource::new(
            "overpass",
            SourceKind::OpenStreetMap,
            vec![record(SourceKind::OpenStreetMap, "node-1", "Clinic", 6.601, 3.351)],
        )]);

        let err = h
            .orchestrator
            .search(&SearchRequest::address("nowhere street"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.sources[0].calls.load(Ordering::SeqCst), 0);
        assert!(h.store.list("default").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn name_search_skips_geocoding_and_distance_filter() {
        let mut places = FakeSource::new(
            "google_places",
            SourceKind::GooglePlaces,
            vec![record(SourceKind::GooglePlaces, "ChIJ1", "Reddington Hospital", 6.43, 3.42)],
        );
        places.name_only = true;
        let h = harness(vec![
            FakeSource::new("overpass", SourceKind::OpenStreetMap, Vec::new()),
            places,
        ]);

        let response = h
            .orchestrator
            .search(&SearchRequest::name("Reddington"))
            .await
            .unwrap();
        assert_eq!(response.search_type, SearchType::Name);
        assert_eq!(response.providers.len(), 1);
        assert!(response.metadata.search_location.is_none());
        assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.sources[0].calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.sources[1].calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spatial_searches_replace_their_scope_only() {
        let h = harness(vec![FakeSource::new(
            "overpass",
            SourceKind::OpenStreetMap,
            vec![record(SourceKind::OpenStreetMap, "node-1", "Clinic", 6.601, 3.351)],
        )]);
        h.store
            .upsert_many(
                "session-a",
                &[medlocate_resolver::merge_group(
                    &[record(SourceKind::Foursquare, "stale", "Stale", 1.0, 1.0)],
                    Utc::now(),
                )
                .unwrap()],
            )
            .await
            .unwrap();
        h.store
            .upsert_many(
                "session-b",
                &[medlocate_resolver::merge_group(
                    &[record(SourceKind::Foursquare, "other", "Other", 1.0, 1.0)],
                    Utc::now(),
                )
                .unwrap()],
            )
            .await
            .unwrap();

        h.orchestrator
            .search(&SearchRequest::location(6.60, 3.35).with_scope("session-a"))
            .await
            .unwrap();

        let a = h.store.list("session-a").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].unique_id, "OSM_node-1");
        assert_eq!(h.store.list("session-b").await.unwrap().len(), 1);

        let stored = h
            .orchestrator
            .provider("session-a", "OSM_node-1")
            .await
            .unwrap();
        assert_eq!(stored.name, "Clinic");
        let err = h
            .orchestrator
            .provider("session-a", "FS_stale")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn name_searches_accumulate_in_scope() {
        let mut places = FakeSource::new(
            "google_places",
            SourceKind::GooglePlaces,
            vec![record(SourceKind::GooglePlaces, "ChIJ1", "Reddington Hospital", 6.43, 3.42)],
        );
        places.name_only = true;
        let h = harness(vec![places]);
        h.store
            .upsert_many(
                "default",
                &[medlocate_resolver::merge_group(
                    &[record(SourceKind::Foursquare, "kept", "Kept", 1.0, 1.0)],
                    Utc::now(),
                )
                .unwrap()],
            )
            .await
            .unwrap();

        h.orchestrator
            .search(&SearchRequest::name("Reddington"))
            .await
            .unwrap();
        assert_eq!(h.store.list("default").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn keyword_filter_runs_over_persisted_results() {
        let h = harness(vec![FakeSource::new(
            "overpass",
            SourceKind::OpenStreetMap,
            vec![
                record(SourceKind::OpenStreetMap, "node-1", "Ikeja Dental Clinic", 6.601, 3.351),
                record(SourceKind::OpenStreetMap, "node-2", "Ikeja Eye Centre", 6.602, 3.352),
            ],
        )]);
        h.orchestrator
            .search(&SearchRequest::location(6.60, 3.35))
            .await
            .unwrap();

        let filter = ProviderFilter {
            keyword: Some("dental".to_string()),
            ..ProviderFilter::default()
        };
        let matches = h
            .orchestrator
            .filter_providers("default", &filter)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].provider.unique_id, "OSM_node-1");
    }

    #[tokio::test]
    async fn standalone_geocoding_does_not_touch_sources() {
        let h = harness(vec![FakeSource::new(
            "overpass",
            SourceKind::OpenStreetMap,
            Vec::new(),
        )]);
        let geocoded = h.orchestrator.geocode_address("Ikeja").await.unwrap();
        assert_eq!(geocoded.country.as_deref(), Some("Nigeria"));
        let reverse = h.orchestrator.reverse_geocode(6.6, 3.35).await.unwrap();
        assert_eq!(reverse.formatted_address, "Ikeja, Lagos, Nigeria");

        let err = h.orchestrator.geocode_address("nowhere").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.sources[0].calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn phase_transitions() {
        use SearchPhase::{
            Done, Failed, Fetching, Idle, Merging, Persisting, RankingAndFiltering, Resolving,
            Validating,
        };

        let spatial = [
            Idle,
            Validating,
            Resolving,
            Fetching,
            Merging,
            RankingAndFiltering,
            Persisting,
            Done,
        ];
        assert!(spatial.windows(2).all(|w| w[0].can_advance_to(w[1])));

        let by_name = [Idle, Validating, Fetching, Merging, Persisting, Done];
        assert!(by_name.windows(2).all(|w| w[0].can_advance_to(w[1])));

        assert!(Fetching.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Fetching));
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Validating));
        assert!(!Merging.can_advance_to(Resolving));
    }

    #[tokio::test]
    async fn failed_persist_keeps_previous_results() {
        let store = Arc::new(SlowStore::default());
        let orchestrator = orchestrator_over(
            &store,
            vec![FakeSource::new(
                "overpass",
                SourceKind::OpenStreetMap,
                vec![record(SourceKind::OpenStreetMap, "node-1", "Clinic", 6.601, 3.351)],
            )],
        );

        orchestrator
            .search(&SearchRequest::location(6.60, 3.35))
            .await
            .unwrap();
        assert_eq!(store.list("default").await.unwrap().len(), 1);

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = orchestrator
            .search(&SearchRequest::location(6.60, 3.35))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let kept = store.list("default").await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].unique_id, "OSM_node-1");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_searches_on_one_scope_do_not_mix() {
        let store = Arc::new(SlowStore {
            write_delay: Some(Duration::from_millis(50)),
            ..SlowStore::default()
        });
        let orchestrator = orchestrator_over(
            &store,
            vec![FakeSource::new(
                "overpass",
                SourceKind::OpenStreetMap,
                vec![
                    record(SourceKind::OpenStreetMap, "node-ikeja-1", "Ikeja Clinic", 6.601, 3.351),
                    record(SourceKind::OpenStreetMap, "node-ikeja-2", "Ikeja Lab", 6.602, 3.352),
                    record(SourceKind::OpenStreetMap, "node-abuja", "Abuja Clinic", 9.071, 7.391),
                ],
            )],
        );

        let ikeja = SearchRequest::location(6.60, 3.35).with_scope("shared");
        let abuja = SearchRequest::location(9.07, 7.39).with_scope("shared");
        let (a, b) = tokio::join!(orchestrator.search(&ikeja), orchestrator.search(&abuja));

        let ids = |providers: &[CanonicalProvider]| {
            let mut ids = providers
                .iter()
                .map(|p| p.unique_id.clone())
                .collect::<Vec<_>>();
            ids.sort();
            ids
        };
        let a = ids(&a.unwrap().providers);
        let b = ids(&b.unwrap().providers);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);

        let stored = ids(&store.list("shared").await.unwrap());
        assert!(stored == a || stored == b, "scope holds {stored:?}");
    }

    #[test]
    fn scope_locks_are_shared_per_scope() {
        let locks = ScopeLocks::default();
        let a = locks.get("a");
        let again = locks.get("a");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &locks.get("b")));
    }
}
