// Geodesy module - receiver-relative distances and elevation
//
// Spherical Earth model only. Positions are latitude/longitude in degrees,
// aircraft altitudes in feet (as logged), receiver altitude in metres.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::constants::{EARTH_RADIUS_M, FT_TO_M, ZERO_COORD_EPS};

/// Degrees to radians conversion factor
const DTOR: f64 = PI / 180.0;

/// Radians to degrees conversion factor
const RTOD: f64 = 180.0 / PI;

/// Fixed ground station position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverLocation {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Altitude above sea level in metres
    pub alt_m: f64,
}

impl ReceiverLocation {
    pub fn new(lat: f64, lon: f64, alt_m: f64) -> Self {
        ReceiverLocation { lat, lon, alt_m }
    }
}

/// Receiver-relative geometry of one aircraft position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geometry {
    /// Great-circle distance along the surface (m)
    pub horizontal_m: Option<f64>,
    /// Straight-line distance (m)
    pub slant_m: Option<f64>,
    /// Angle above the receiver's horizontal (degrees)
    pub elevation_deg: Option<f64>,
    /// Aircraft altitude converted to metres
    pub altitude_m: Option<f64>,
}

impl Geometry {
    /// Aircraft height relative to the receiver (m)
    pub fn height_above(&self, receiver: &ReceiverLocation) -> Option<f64> {
        self.altitude_m.map(|alt| alt - receiver.alt_m)
    }
}

/// True when a position is missing or is the (0,0) "no fix" sentinel.
///
/// A genuine fix at (0°, 0°) is indistinguishable from the sentinel and is
/// treated as missing as well.
pub fn is_no_fix(lat: Option<f64>, lon: Option<f64>) -> bool {
    match (lat, lon) {
        (Some(lat), Some(lon)) => lat.abs() < ZERO_COORD_EPS && lon.abs() < ZERO_COORD_EPS,
        _ => true,
    }
}

/// Returns great-circle distance in meters between two points (haversine)
///
/// **Assumes spherical Earth** with radius 6371 km.
///
/// # Example
/// ```
/// use adsb_enrich::geodesy::great_circle_distance;
/// let d = great_circle_distance(51.5074, -0.1278, 48.8566, 2.3522); // London to Paris
/// assert!((d - 344_000.0).abs() < 5_000.0);
/// ```
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1 * DTOR;
    let phi2 = lat2 * DTOR;
    let dphi = (lat2 - lat1) * DTOR;
    let dlmb = (lon2 - lon1) * DTOR;

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlmb / 2.0).sin().powi(2);
    // Clamp guards asin against rounding just above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Compute horizontal distance, slant range and elevation of an aircraft as
/// seen from `receiver`.
///
/// Nothing is computed without a valid position. Slant range and elevation
/// additionally need a non-zero altitude (zero means "unknown" in these logs).
pub fn geometry(
    receiver: &ReceiverLocation,
    lat: Option<f64>,
    lon: Option<f64>,
    altitude_ft: Option<f64>,
) -> Geometry {
    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) if !is_no_fix(Some(lat), Some(lon)) => (lat, lon),
        _ => return Geometry::default(),
    };

    let horizontal = great_circle_distance(receiver.lat, receiver.lon, lat, lon);

    let altitude_ft = match altitude_ft {
        Some(alt) if alt != 0.0 => alt,
        _ => {
            return Geometry {
                horizontal_m: Some(horizontal),
                ..Geometry::default()
            }
        }
    };

    let altitude_m = altitude_ft * FT_TO_M;
    let dh = altitude_m - receiver.alt_m;
    let slant = (horizontal * horizontal + dh * dh).sqrt();
    let elevation = if horizontal > 0.0 {
        dh.atan2(horizontal) * RTOD
    } else if dh > 0.0 {
        90.0
    } else {
        -90.0
    };

    Geometry {
        horizontal_m: Some(horizontal),
        slant_m: Some(slant),
        elevation_deg: Some(elevation),
        altitude_m: Some(altitude_m),
    }
}
