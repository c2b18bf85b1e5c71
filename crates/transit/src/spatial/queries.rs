//! Spatial query utilities for distance calculations.
//!
//! Uses the Haversine formula on a spherical Earth of radius 6371 km.

use geo::Point;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree of latitude (and of longitude at the equator)
pub const KM_PER_DEGREE: f64 = 111.32;

pub fn to_radians(degrees: f64) -> f64 {
    degrees * (std::f64::consts::PI / 180.0)
}

/// Great-circle distance between two points in kilometres.
///
/// Points are `geo` points, so x is longitude and y is latitude.
pub fn haversine_distance_km(p1: Point, p2: Point) -> f64 {
    let d_lat = to_radians(p2.y() - p1.y());
    let d_lon = to_radians(p2.x() - p1.x());

    let a = (d_lat / 2.0).sin().powi(2)
        + to_radians(p1.y()).cos() * to_radians(p2.y()).cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Convert kilometres to degrees of latitude (for bounding box queries)
pub fn km_to_degrees_approx(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

/// Search radius in degrees that covers `km` in every direction around `latitude`.
///
/// Degrees of longitude shrink towards the poles, so the radius is widened
/// by 1/cos(latitude), capped near the poles.
pub fn search_radius_degrees(km: f64, latitude: f64) -> f64 {
    km_to_degrees_approx(km) / to_radians(latitude).cos().abs().max(0.01)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_distance() {
        // Distance from NYC to LA is approximately 3,936 km
        let nyc = Point::new(-74.0060, 40.7128);
        let la = Point::new(-118.2437, 34.0522);

        let dist = haversine_distance_km(nyc, la);
        assert!((dist - 3_936.0).abs() < 50.0); // Within 50km
    }

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let pairs = [
            (Point::new(78.1198, 9.9252), Point::new(78.1500, 9.9400)),
            (Point::new(-0.1278, 51.5074), Point::new(2.3522, 48.8566)),
            (Point::new(179.9, -10.0), Point::new(-179.9, -10.0)),
        ];

        for (a, b) in pairs {
            assert_relative_eq!(haversine_distance_km(a, b), haversine_distance_km(b, a));
            assert_eq!(haversine_distance_km(a, a), 0.0);
        }
    }

    #[test]
    fn test_haversine_monotonic() {
        let origin = Point::new(78.0, 10.0);
        let near = haversine_distance_km(origin, Point::new(78.0, 10.1));
        let far = haversine_distance_km(origin, Point::new(78.0, 10.2));
        assert!(near < far);

        // One degree of latitude is ~111 km
        assert_relative_eq!(
            haversine_distance_km(Point::new(0.0, 0.0), Point::new(0.0, 1.0)),
            111.19,
            epsilon = 0.01
        );
    }

    #[test]
    fn test_search_radius_widens_with_latitude() {
        assert_relative_eq!(search_radius_degrees(111.32, 0.0), 1.0);
        assert!(search_radius_degrees(1.0, 60.0) > search_radius_degrees(1.0, 0.0));
    }
}
