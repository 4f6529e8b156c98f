//! Great-circle distance between coordinates.

use serde::{Deserialize, Serialize};

use crate::error::{CarshareError, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, `-90..=90`.
    pub lat: f64,

    /// Longitude in degrees, `-180..=180`.
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check that both components are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`CarshareError::Computation`] for NaN, infinite or
    /// out-of-range components.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(CarshareError::Computation(format!(
                "latitude {} is outside -90..=90",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(CarshareError::Computation(format!(
                "longitude {} is outside -180..=180",
                self.lon
            )));
        }
        Ok(())
    }

    /// Haversine distance to `other` in kilometres.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(*self, *other)
    }
}

/// Haversine great-circle distance in kilometres.
///
/// Symmetric in its arguments and zero for identical points.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat.mul_add(sin_dlat, lat1.cos() * lat2.cos() * sin_dlon * sin_dlon);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const BENGALURU_MG_ROAD: GeoPoint = GeoPoint::new(12.9716, 77.5946);
    const BENGALURU_KORAMANGALA: GeoPoint = GeoPoint::new(12.9352, 77.6245);

    #[test]
    fn test_known_city_distance() {
        let d = haversine_km(BENGALURU_MG_ROAD, BENGALURU_KORAMANGALA);
        assert!((d - 5.185).abs() < 0.005, "got {d}");
    }

    #[test]
    fn test_short_distance_matches_equirectangular() {
        let (a, b) = (BENGALURU_MG_ROAD, BENGALURU_KORAMANGALA);
        let mean_lat = ((a.lat + b.lat) * 0.5).to_radians();
        let x = (b.lon - a.lon).to_radians() * mean_lat.cos();
        let y = (b.lat - a.lat).to_radians();
        let flat = EARTH_RADIUS_KM * x.hypot(y);

        let d = haversine_km(a, b);
        assert!((d - flat).abs() < 1e-3, "haversine {d}, flat {flat}");
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for p in [
            BENGALURU_MG_ROAD,
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(-33.8688, 151.2093),
            GeoPoint::new(89.9, -179.9),
        ] {
            assert!(haversine_km(p, p).abs() < 1e-9);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (BENGALURU_MG_ROAD, BENGALURU_KORAMANGALA),
            (GeoPoint::new(51.5074, -0.1278), GeoPoint::new(40.7128, -74.0060)),
            (GeoPoint::new(-89.0, 179.0), GeoPoint::new(89.0, -179.0)),
        ];
        for (a, b) in pairs {
            assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_antipodal_distance_is_half_circumference() {
        let d = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_method_matches_free_function() {
        assert!(
            (BENGALURU_MG_ROAD.distance_km(&BENGALURU_KORAMANGALA)
                - haversine_km(BENGALURU_MG_ROAD, BENGALURU_KORAMANGALA))
            .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_validate_rejects_bad_coordinates() {
        assert!(GeoPoint::new(12.0, 77.0).validate().is_ok());
        assert!(GeoPoint::new(f64::NAN, 77.0).validate().is_err());
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -180.5).validate().is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).validate().is_err());
    }
}
