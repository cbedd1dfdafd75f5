//! Spherical geometry helpers: great-circle distance, forward azimuth and
//! angle arithmetic on the compass circle. Everything here works in degrees
//! at the API boundary and converts to radians internally.

/// Degrees, as used throughout the crate for latitude, longitude and
/// compass angles.
pub type Degree = f64;

/// Mean Earth radius used for the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the globe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude in degrees, north positive
    pub lat: Degree,
    /// Longitude in degrees, east positive
    pub lon: Degree,
}

impl Coordinate {
    /// Creates a coordinate from a latitude and longitude in degrees.
    pub fn new(lat: Degree, lon: Degree) -> Self {
        Self { lat, lon }
    }

    /// Returns true if the latitude is in [-90, 90], the longitude in
    /// [-180, 180) and both are finite.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..180.0).contains(&self.lon)
    }
}

/// Great-circle distance between `from` and `to`, in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Forward azimuth from `from` to `to`, clockwise from north, in [0, 360).
///
/// Identical points give a bearing of 0.
pub fn bearing_deg(from: Coordinate, to: Coordinate) -> Degree {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    normalize_deg(y.atan2(x).to_degrees())
}

/// Wraps any angle onto [0, 360).
pub fn normalize_deg(angle: Degree) -> Degree {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Shortest distance between two compass angles, in [0, 180].
pub fn circular_diff_deg(a: Degree, b: Degree) -> Degree {
    let diff = normalize_deg(a - b);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}
