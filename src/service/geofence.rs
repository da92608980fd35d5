use crate::config::OfficeLocation;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two WGS84 points.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Missing or unusable coordinates count as outside the office.
pub fn is_within_office(latitude: Option<f64>, longitude: Option<f64>, office: &OfficeLocation) -> bool {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
            haversine_meters(lat, lon, office.latitude, office.longitude) <= office.radius_meters
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFICE: OfficeLocation = OfficeLocation {
        latitude: 13.0827,
        longitude: 80.2707,
        radius_meters: 200.0,
    };

    #[test]
    fn same_point_is_zero_distance() {
        assert!(haversine_meters(13.0827, 80.2707, 13.0827, 80.2707) < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn nearby_point_is_inside_geofence() {
        // ~110 m north of the office.
        assert!(is_within_office(Some(13.0837), Some(80.2707), &OFFICE));
    }

    #[test]
    fn distant_point_is_outside_geofence() {
        assert!(!is_within_office(Some(13.0927), Some(80.2707), &OFFICE));
    }

    #[test]
    fn missing_location_counts_as_outside() {
        assert!(!is_within_office(None, Some(80.2707), &OFFICE));
        assert!(!is_within_office(None, None, &OFFICE));
        assert!(!is_within_office(Some(f64::NAN), Some(80.2707), &OFFICE));
    }
}
