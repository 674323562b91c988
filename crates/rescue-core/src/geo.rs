//! Great-circle distance between coordinates.
//!
//! Distances use the haversine formula on a spherical Earth of mean radius
//! [`EARTH_RADIUS_KM`]. Inputs are plain degrees; only [`Coordinate::validate`]
//! checks ranges, [`distance_km`] itself accepts whatever it is given.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and inside the
    /// latitude [-90, 90] / longitude [-180, 180] ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CoreError::invalid_coordinate(self.latitude, self.longitude))
        }
    }
}

/// Geographic position of a case, hospital or responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Human-readable address, if the reporter or a geocoder supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl From<&Location> for Coordinate {
    fn from(location: &Location) -> Self {
        location.coordinate()
    }
}

impl From<Location> for Coordinate {
    fn from(location: Location) -> Self {
        location.coordinate()
    }
}

/// Haversine distance in kilometers.
///
/// Arguments are put in a canonical order first so the result is bit-for-bit
/// identical for `(a, b)` and `(b, a)`.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let (a, b) = if a
        .latitude
        .total_cmp(&b.latitude)
        .then(a.longitude.total_cmp(&b.longitude))
        .is_le()
    {
        (a, b)
    } else {
        (b, a)
    };

    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}
