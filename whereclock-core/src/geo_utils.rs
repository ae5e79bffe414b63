//! Geographic utilities: great-circle distance and path length.

use crate::GpsPoint;

/// Earth radius used for all distance calculations (spherical model).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate haversine distance between two GPS points in meters.
///
/// Symmetric, and exactly zero for identical points.
///
/// # Example
/// ```
/// use whereclock_core::{GpsPoint, geo_utils::haversine_distance};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 1.0);
/// let d = haversine_distance(&a, &b);
/// assert!((d - 111_194.9).abs() < 1.0);
/// ```
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    if p1 == p2 {
        return 0.0;
    }

    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lng = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Total length of a path in kilometers. Zero for fewer than two points.
pub fn path_length_km(points: &[GpsPoint]) -> f64 {
    polyline_length(points) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_symmetric() {
        let madrid = GpsPoint::new(40.4168, -3.7038);
        let london = GpsPoint::new(51.5074, -0.1278);

        let ab = haversine_distance(&madrid, &london);
        let ba = haversine_distance(&london, &madrid);
        assert_eq!(ab, ba);
        // Madrid to London is roughly 1260 km
        assert!((ab / 1000.0 - 1264.0).abs() < 10.0);
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let p = GpsPoint::new(40.4168, -3.7038);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_one_degree_at_equator() {
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 1.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((haversine_distance(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_path_length() {
        assert_eq!(path_length_km(&[]), 0.0);
        assert_eq!(path_length_km(&[GpsPoint::new(1.0, 1.0)]), 0.0);

        let points = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 1.0),
            GpsPoint::new(0.0, 2.0),
        ];
        let km = path_length_km(&points);
        assert!((km - 222.39).abs() < 0.01);
    }
}
