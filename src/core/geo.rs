//! Geographic Primitives
//!
//! Coordinates and great-circle distance, the error metric for every guess.
//! Pure functions only - the engine and the aggregator both call into here.

use serde::{Serialize, Deserialize};

/// Mean earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A geographic coordinate in decimal degrees.
///
/// Latitude is constrained to [-90, 90], longitude to [-180, 180].
/// Wire deserialization does not enforce the bounds - callers validate
/// with [`Coordinate::in_bounds`] before trusting client input.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate, returning `None` when out of range or non-finite.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let c = Self { lat, lng };
        if c.in_bounds() { Some(c) } else { None }
    }

    /// Check that both components are finite and within valid ranges.
    pub fn in_bounds(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Great-circle distance between two coordinates in meters.
///
/// Haversine formula on a spherical earth. Symmetric, non-negative, and
/// zero exactly when both coordinates are equal. Accurate to ~0.5% against
/// an ellipsoidal model, which is far below the scoring resolution.
pub fn great_circle_distance_m(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    // Clamp guards against rounding pushing sqrt's argument past 1.0
    // for antipodal points.
    let central_angle = 2.0 * h.sqrt().clamp(0.0, 1.0).asin();

    EARTH_RADIUS_M * central_angle
}

// =============================================================================
// TESTS
// =============================================================================
