use crate::model::{Coordinates, Location};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two WGS84 points, in meters.
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

pub fn validate_coordinates(p: Coordinates) -> Result<(), String> {
    if !p.latitude.is_finite() || !(-90.0..=90.0).contains(&p.latitude) {
        return Err("latitude must be between -90 and 90".to_string());
    }
    if !p.longitude.is_finite() || !(-180.0..=180.0).contains(&p.longitude) {
        return Err("longitude must be between -180 and 180".to_string());
    }
    Ok(())
}

/// First active location whose radius contains `point`.
pub fn find_matching_location<'a>(
    point: Coordinates,
    locations: &'a [Location],
) -> Option<&'a Location> {
    locations
        .iter()
        .filter(|l| l.active)
        .find(|l| haversine_distance(point, l.center()) <= f64::from(l.radius_meters))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearestLocation {
    pub name: String,
    pub distance_meters: f64,
    pub radius_meters: u32,
}

/// Nearest active location, used to tell a rejected user how far off they are.
pub fn nearest_location(point: Coordinates, locations: &[Location]) -> Option<NearestLocation> {
    locations
        .iter()
        .filter(|l| l.active)
        .map(|l| (l, haversine_distance(point, l.center())))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(l, d)| NearestLocation {
            name: l.name.clone(),
            distance_meters: d,
            radius_meters: l.radius_meters,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(id: &str, lat: f64, lng: f64, radius: u32) -> Location {
        Location {
            id: id.to_string(),
            name: id.to_string(),
            latitude: lat,
            longitude: lng,
            radius_meters: radius,
            active: true,
        }
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let a = Coordinates::new(-6.9, 110.2);
        let b = Coordinates::new(-7.25, 112.75);
        assert_eq!(haversine_distance(a, a), 0.0);
        assert!((haversine_distance(a, b) - haversine_distance(b, a)).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_distance(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn center_point_always_matches() {
        let locations = vec![loc("gate", -6.9, 110.2, 1)];
        let m = find_matching_location(Coordinates::new(-6.9, 110.2), &locations);
        assert_eq!(m.map(|l| l.id.as_str()), Some("gate"));
    }

    #[test]
    fn point_outside_radius_never_matches() {
        // ~111 m north of the center.
        let p = Coordinates::new(-6.899, 110.2);
        let locations = vec![loc("gate", -6.9, 110.2, 100), loc("far", 0.0, 0.0, 500)];
        assert!(find_matching_location(p, &locations).is_none());

        let locations = vec![loc("gate", -6.9, 110.2, 120)];
        assert!(find_matching_location(p, &locations).is_some());
    }

    #[test]
    fn inactive_locations_are_ignored() {
        let mut l = loc("gate", -6.9, 110.2, 50);
        l.active = false;
        assert!(find_matching_location(Coordinates::new(-6.9, 110.2), &[l.clone()]).is_none());
        assert!(nearest_location(Coordinates::new(-6.9, 110.2), &[l]).is_none());
    }

    #[test]
    fn first_containing_location_wins() {
        let locations = vec![loc("a", -6.9, 110.2, 500), loc("b", -6.9, 110.2, 50)];
        let m = find_matching_location(Coordinates::new(-6.9, 110.2), &locations);
        assert_eq!(m.map(|l| l.id.as_str()), Some("a"));
    }

    #[test]
    fn nearest_reports_closest_active() {
        let locations = vec![loc("near", -6.901, 110.2, 10), loc("far", -6.95, 110.2, 10)];
        let n = nearest_location(Coordinates::new(-6.9, 110.2), &locations).expect("nearest");
        assert_eq!(n.name, "near");
        assert!((n.distance_meters - 111.2).abs() < 0.5);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(validate_coordinates(Coordinates::new(91.0, 0.0)).is_err());
        assert!(validate_coordinates(Coordinates::new(0.0, -181.0)).is_err());
        assert!(validate_coordinates(Coordinates::new(f64::NAN, 0.0)).is_err());
        assert!(validate_coordinates(Coordinates::new(-6.9, 110.2)).is_ok());
    }
}
