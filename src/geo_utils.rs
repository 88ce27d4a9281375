//! Geographic utilities: great-circle distance and path length.

use crate::types::GpsPoint;

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle (haversine) distance between two points, in meters.
pub fn haversine_distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Total distance along a path, in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Helsinki cathedral to Helsinki central station, roughly 600 m.
        let a = GpsPoint::new(60.1699, 24.9524);
        let b = GpsPoint::new(60.1719, 24.9414);
        let d = haversine_distance(&a, &b);
        assert!(d > 500.0 && d < 750.0, "got {d}");
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let p = GpsPoint::new(60.1, 24.9);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = GpsPoint::new(51.5074, -0.1278);
        let b = GpsPoint::new(48.8566, 2.3522);
        let ab = haversine_distance(&a, &b);
        let ba = haversine_distance(&b, &a);
        assert!((ab - ba).abs() < 1e-6);
        // London to Paris is ~344 km.
        assert!(ab > 330_000.0 && ab < 360_000.0);
    }

    #[test]
    fn test_polyline_length_sums_pairs() {
        let points = vec![
            GpsPoint::new(60.10, 24.90),
            GpsPoint::new(60.11, 24.90),
            GpsPoint::new(60.12, 24.90),
        ];
        let total = polyline_length(&points);
        let first = haversine_distance(&points[0], &points[1]);
        let second = haversine_distance(&points[1], &points[2]);
        assert!((total - (first + second)).abs() < 1e-9);

        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&points[..1]), 0.0);
    }
}
