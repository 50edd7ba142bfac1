//! Great-circle distance using the haversine formula.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the Earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Returns the great-circle distance between `a` and `b` in kilometres.
///
/// Invalid input (NaN or out-of-range degrees) is not rejected: NaN simply
/// propagates, and callers must treat a NaN distance as "not matchable".
///
/// # Examples
///
/// ```
/// # use vigil::geo::{Coordinates, distance_km};
/// let delhi = Coordinates::new(28.70, 77.10);
/// assert_eq!(distance_km(delhi, delhi), 0.0);
/// ```
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.0).sin().powi(2);

    // Rounding can push h marginally above 1 for antipodal points; clamp keeps NaN
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(0.0, 1.0).asin()
}
