pub mod index;

pub use index::{GeoIndex, NearbyAgent, NearbyQuery};

use crate::models::agent::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b) * 1_000.0
}

pub fn path_length_km<'a, I>(points: I) -> f64
where
    I: IntoIterator<Item = &'a GeoPoint>,
{
    let mut total = 0.0;
    let mut previous: Option<&GeoPoint> = None;
    for point in points {
        if let Some(prev) = previous {
            total += haversine_km(prev, point);
        }
        previous = Some(point);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, haversine_m, path_length_km};
    use crate::models::agent::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(28.6139, 77.2090);
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn delhi_to_noida_is_around_34_km() {
        let rohini = GeoPoint::new(28.7041, 77.1025);
        let noida = GeoPoint::new(28.5355, 77.3910);
        let distance = haversine_km(&rohini, &noida);
        assert!((distance - 33.83).abs() < 0.05, "got {distance}");
    }

    #[test]
    fn meters_scale_kilometers() {
        let a = GeoPoint::new(28.6139, 77.2090);
        let b = GeoPoint::new(28.6149, 77.2090);
        assert!((haversine_m(&a, &b) - haversine_km(&a, &b) * 1_000.0).abs() < 1e-9);
        assert!((haversine_m(&a, &b) - 111.2).abs() < 1.0);
    }

    #[test]
    fn path_length_sums_legs() {
        let a = GeoPoint::new(28.6000, 77.2000);
        let b = GeoPoint::new(28.6100, 77.2000);
        let c = GeoPoint::new(28.6200, 77.2000);
        let total = path_length_km([&a, &b, &c]);
        assert!((total - haversine_km(&a, &c)).abs() < 1e-6);
        assert_eq!(path_length_km([&a]), 0.0);
    }
}
