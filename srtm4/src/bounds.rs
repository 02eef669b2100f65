//! Geographic bounds and interval arithmetic.

use crate::error::{Result, SrtmError};

/// A geographic rectangle in decimal degrees (WGS84).
///
/// Field order follows the `(west, south, east, north)` convention used for
/// crop requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Western boundary longitude.
    pub lon_min: f64,
    /// Southern boundary latitude.
    pub lat_min: f64,
    /// Eastern boundary longitude.
    pub lon_max: f64,
    /// Northern boundary latitude.
    pub lat_max: f64,
}

impl Bounds {
    /// Create new bounds from `(lon_min, lat_min, lon_max, lat_max)`.
    pub fn new(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Self {
        Self {
            lon_min,
            lat_min,
            lon_max,
            lat_max,
        }
    }

    /// Longitude extent as an interval.
    pub fn lon_interval(&self) -> (f64, f64) {
        (self.lon_min, self.lon_max)
    }

    /// Latitude extent as an interval.
    pub fn lat_interval(&self) -> (f64, f64) {
        (self.lat_min, self.lat_max)
    }

    /// Width in degrees.
    pub fn width(&self) -> f64 {
        self.lon_max - self.lon_min
    }
}

impl From<(f64, f64, f64, f64)> for Bounds {
    fn from((lon_min, lat_min, lon_max, lat_max): (f64, f64, f64, f64)) -> Self {
        Self::new(lon_min, lat_min, lon_max, lat_max)
    }
}

/// Wrap a longitude into the `[-180, 180)` interval.
///
/// ```
/// use srtm4::bounds::wrap_lon;
///
/// assert_eq!(wrap_lon(185.0), -175.0);
/// assert_eq!(wrap_lon(180.0), -180.0);
/// assert_eq!(wrap_lon(-185.0), 175.0);
/// assert_eq!(wrap_lon(12.5), 12.5);
/// ```
pub fn wrap_lon(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid may round up to exactly 360 for tiny negative inputs
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Check that `(low, high)` is a proper interval.
pub fn assert_interval(interval: (f64, f64)) -> Result<()> {
    let (low, high) = interval;
    // Negated so that NaN endpoints are rejected too
    if !(high > low) {
        return Err(SrtmError::InvalidInterval { low, high });
    }
    Ok(())
}

/// Intersect two intervals.
///
/// Both inputs must satisfy `high > low`. Returns `Ok(None)` when the
/// intervals do not overlap. Intervals touching at a single point intersect
/// in that point.
///
/// ```
/// use srtm4::bounds::intersect_interval;
///
/// assert_eq!(intersect_interval((0.0, 2.0), (1.0, 3.0)).unwrap(), Some((1.0, 2.0)));
/// assert_eq!(intersect_interval((0.0, 1.0), (2.0, 3.0)).unwrap(), None);
/// assert!(intersect_interval((1.0, 1.0), (0.0, 3.0)).is_err());
/// ```
pub fn intersect_interval(one: (f64, f64), other: (f64, f64)) -> Result<Option<(f64, f64)>> {
    assert_interval(one)?;
    assert_interval(other)?;

    let low = one.0.max(other.0);
    let high = one.1.min(other.1);

    if low > high {
        Ok(None)
    } else {
        Ok(Some((low, high)))
    }
}
