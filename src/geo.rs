use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geocoded place, as cached in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub label: String,
}

pub fn haversine_distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint {
            lat,
            lon,
            label: String::new(),
        }
    }

    #[test]
    fn berlin_to_hamburg_is_about_255_km() {
        let berlin = point(52.52, 13.405);
        let hamburg = point(53.5511, 9.9937);
        let distance = haversine_distance_km(&berlin, &hamburg);
        assert!((250.0..260.0).contains(&distance), "got {distance}");
    }

    #[test]
    fn zero_distance_to_self() {
        let p = point(48.1351, 11.582);
        assert!(haversine_distance_km(&p, &p) < 1e-9);
    }
}
