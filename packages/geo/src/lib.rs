#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pure geographic math used by search and filtering.
//!
//! Distances use the haversine formula on a spherical Earth. None of the
//! functions here validate their inputs; call [`validate_coordinates`] at the
//! boundary where untrusted points enter the system.

use medlocate_provider_models::{
    BoundingBox, CanonicalProvider, Coordinates, RawProviderRecord,
};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate kilometers per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Why a coordinate pair was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateError {
    /// Latitude or longitude is NaN or infinite.
    #[error("coordinates must be finite numbers")]
    NotFinite,
    /// Latitude outside -90..=90.
    #[error("latitude must be between -90 and 90")]
    LatitudeOutOfRange,
    /// Longitude outside -180..=180.
    #[error("longitude must be between -180 and 180")]
    LongitudeOutOfRange,
}

/// Checks that `point` is a finite, in-range WGS84 coordinate.
///
/// # Errors
///
/// * [`CoordinateError::NotFinite`] if either component is NaN or infinite
/// * [`CoordinateError::LatitudeOutOfRange`] / [`CoordinateError::LongitudeOutOfRange`]
///   if a component falls outside its valid range
pub fn validate_coordinates(point: Coordinates) -> Result<Coordinates, CoordinateError> {
    if !point.latitude.is_finite() || !point.longitude.is_finite() {
        return Err(CoordinateError::NotFinite);
    }
    if !(-90.0..=90.0).contains(&point.latitude) {
        return Err(CoordinateError::LatitudeOutOfRange);
    }
    if !(-180.0..=180.0).contains(&point.longitude) {
        return Err(CoordinateError::LongitudeOutOfRange);
    }
    Ok(point)
}

/// Great-circle distance between two points in kilometers.
///
/// Non-finite input propagates as NaN.
#[must_use]
pub fn haversine_distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Rectangular region around `center` spanning `radius_km` in each
/// direction, using the flat `radius / 111` degree approximation.
#[must_use]
pub fn bounding_box(center: Coordinates, radius_km: f64) -> BoundingBox {
    let delta = radius_km / KM_PER_DEGREE;
    BoundingBox::new(
        center.latitude - delta,
        center.longitude - delta,
        center.latitude + delta,
        center.longitude + delta,
    )
}

/// Anything with a point location.
pub trait HasCoordinates {
    /// The item's point location.
    fn coordinates(&self) -> Coordinates;
}

impl HasCoordinates for Coordinates {
    fn coordinates(&self) -> Coordinates {
        *self
    }
}

impl HasCoordinates for RawProviderRecord {
    fn coordinates(&self) -> Coordinates {
        self.coordinates
    }
}

impl HasCoordinates for CanonicalProvider {
    fn coordinates(&self) -> Coordinates {
        self.location.coordinates
    }
}

impl<T: HasCoordinates> HasCoordinates for &T {
    fn coordinates(&self) -> Coordinates {
        (*self).coordinates()
    }
}

/// An item paired with its distance from a search origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    /// The candidate.
    pub item: T,
    /// Distance from the origin in kilometers.
    pub distance_km: f64,
}

/// Keeps candidates within `max_distance_km` of `origin` (inclusive),
/// sorted ascending by distance.
///
/// Ties keep their input order. Candidates whose distance is NaN are
/// dropped.
#[must_use]
pub fn filter_by_distance<T: HasCoordinates>(
    origin: Coordinates,
    candidates: impl IntoIterator<Item = T>,
    max_distance_km: f64,
) -> Vec<Ranked<T>> {
    let mut ranked = candidates
        .into_iter()
        .filter_map(|item| {
            let distance_km = haversine_distance_km(origin, item.coordinates());
            (distance_km <= max_distance_km).then_some(Ranked { item, distance_km })
        })
        .collect::<Vec<_>>();

    // `sort_by` is stable, so equal distances keep input order.
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAGOS: Coordinates = Coordinates::new(6.5244, 3.3792);
    const ABUJA: Coordinates = Coordinates::new(9.0765, 7.3986);

    #[test]
    fn distance_to_self_is_zero() {
        assert!(haversine_distance_km(LAGOS, LAGOS).abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = haversine_distance_km(LAGOS, ABUJA);
        let ba = haversine_distance_km(ABUJA, LAGOS);
        assert!((ab - ba).abs() < 1e-9);
        // Lagos to Abuja is roughly 525 km as the crow flies.
        assert!((500.0..560.0).contains(&ab), "got {ab}");
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_distance_km(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0));
        assert!((d - 111.19).abs() < 0.1, "got {d}");
    }

    #[test]
    fn nan_input_propagates() {
        let d = haversine_distance_km(Coordinates::new(f64::NAN, 0.0), LAGOS);
        assert!(d.is_nan());
    }

    #[test]
    fn validate_rejects_out_of_range_and_non_finite() {
        assert!(validate_coordinates(LAGOS).is_ok());
        assert_eq!(
            validate_coordinates(Coordinates::new(91.0, 0.0)),
            Err(CoordinateError::LatitudeOutOfRange)
        );
        assert_eq!(
            validate_coordinates(Coordinates::new(0.0, -180.5)),
            Err(CoordinateError::LongitudeOutOfRange)
        );
        assert_eq!(
            validate_coordinates(Coordinates::new(f64::INFINITY, 0.0)),
            Err(CoordinateError::NotFinite)
        );
    }

    #[test]
    fn bounding_box_spans_radius_over_111() {
        let bbox = bounding_box(Coordinates::new(10.0, 20.0), 11.1);
        assert!((bbox.south - 9.9).abs() < 1e-9);
        assert!((bbox.north - 10.1).abs() < 1e-9);
        assert!((bbox.west - 19.9).abs() < 1e-9);
        assert!((bbox.east - 20.1).abs() < 1e-9);
        assert!(bbox.contains(Coordinates::new(10.0, 20.0)));
    }

    #[test]
    fn filter_sorts_ascending_and_drops_far_points() {
        let near = Coordinates::new(6.53, 3.38);
        let nearer = Coordinates::new(6.525, 3.3795);
        let far = ABUJA;

        let ranked = filter_by_distance(LAGOS, vec![near, far, nearer], 10.0);
        let points = ranked.iter().map(|r| r.item).collect::<Vec<_>>();
        assert_eq!(points, vec![nearer, near]);
        assert!(ranked[0].distance_km <= ranked[1].distance_km);
    }

    #[test]
    fn filter_keeps_input_order_for_ties() {
        let a = RawProviderRecord::new(
            medlocate_provider_models::SourceKind::OpenStreetMap,
            "1",
            "A",
            Coordinates::new(6.53, 3.38),
        );
        let mut b = a.clone();
        b.source_id = "2".to_string();
        b.name = "B".to_string();

        let ranked = filter_by_distance(LAGOS, vec![&a, &b], 10.0);
        assert_eq!(ranked[0].item.name, "A");
        assert_eq!(ranked[1].item.name, "B");
    }

    #[test]
    fn filter_is_inclusive_at_the_boundary() {
        let target = Coordinates::new(1.0, 0.0);
        let exact = haversine_distance_km(Coordinates::new(0.0, 0.0), target);
        let ranked = filter_by_distance(Coordinates::new(0.0, 0.0), vec![target], exact);
        assert_eq!(ranked.len(), 1);
    }
}
