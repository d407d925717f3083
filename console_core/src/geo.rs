use console_proto::GeoOrigin;

/// Spherical earth radius used for range/azimuth placement, metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl From<GeoOrigin> for LatLng {
    fn from(origin: GeoOrigin) -> Self {
        Self::new(origin.latitude, origin.longitude)
    }
}

/// Point reached from `origin` travelling `range_m` metres along `azimuth_deg`
/// (clockwise from true north) on a spherical earth.
pub fn destination(origin: LatLng, azimuth_deg: f64, range_m: f64) -> LatLng {
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();
    let bearing = azimuth_deg.rem_euclid(360.0).to_radians();
    let angular = range_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    LatLng::new(lat2.to_degrees(), normalize_longitude(lng2.to_degrees()))
}

fn normalize_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lng > 0.0 {
        180.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn zero_range_stays_put() {
        let origin = LatLng::new(10.0, 20.0);
        let point = destination(origin, 123.0, 0.0);
        assert!(close(point.lat, 10.0));
        assert!(close(point.lng, 20.0));
    }

    #[test]
    fn north_and_east_move_the_right_axis() {
        let origin = LatLng::new(0.0, 0.0);
        let quarter = std::f64::consts::FRAC_PI_2 * EARTH_RADIUS_M;
        let north = destination(origin, 0.0, quarter);
        assert!(close(north.lat, 90.0));

        let one_degree = EARTH_RADIUS_M.to_radians();
        let east = destination(origin, 90.0, one_degree);
        assert!(close(east.lat, 0.0));
        assert!(close(east.lng, 1.0));
    }

    #[test]
    fn longitudes_wrap_at_the_antimeridian() {
        let origin = LatLng::new(0.0, 179.5);
        let one_degree = EARTH_RADIUS_M.to_radians();
        let point = destination(origin, 90.0, one_degree);
        assert!(close(point.lng, -179.5));
    }
}
