use crate::models::courier::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const MILES_PER_KM: f64 = 0.621_371;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b) * MILES_PER_KM
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, haversine_miles};
    use crate::models::courier::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 40.7128,
            lng: -74.0060,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn city_hall_to_coney_island_is_around_ten_miles() {
        let city_hall = GeoPoint {
            lat: 40.7128,
            lng: -74.0060,
        };
        let coney_island = GeoPoint {
            lat: 40.5755,
            lng: -73.9707,
        };
        let distance = haversine_miles(&city_hall, &coney_island);
        assert!((distance - 9.7).abs() < 1.0);
    }
}
