pub mod resolver;

use crate::models::location::GeoPoint;

/// Mean earth radius used for straight-line leg estimates.
const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two coordinates.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (phi_a, phi_b) = (a.lat.to_radians(), b.lat.to_radians());
    let half_dphi = (phi_b - phi_a) / 2.0;
    let half_dlambda = (b.lng - a.lng).to_radians() / 2.0;

    let h = half_dphi.sin().powi(2) + phi_a.cos() * phi_b.cos() * half_dlambda.sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::haversine_km;
    use crate::models::location::GeoPoint;

    const BERLIN_HBF: GeoPoint = GeoPoint {
        lat: 52.5251,
        lng: 13.3694,
    };
    const DRESDEN: GeoPoint = GeoPoint {
        lat: 51.0404,
        lng: 13.7320,
    };

    #[test]
    fn same_point_is_zero() {
        assert!(haversine_km(&DRESDEN, &DRESDEN) < 1e-9);
    }

    #[test]
    fn berlin_to_dresden_is_about_167_km() {
        let distance = haversine_km(&BERLIN_HBF, &DRESDEN);
        assert!((distance - 167.0).abs() < 5.0, "{distance}");
    }

    #[test]
    fn distance_is_symmetric() {
        let there = haversine_km(&BERLIN_HBF, &DRESDEN);
        let back = haversine_km(&DRESDEN, &BERLIN_HBF);
        assert!((there - back).abs() < 1e-9);
    }
}
