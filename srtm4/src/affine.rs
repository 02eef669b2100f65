//! Affine georeferencing transforms.

/// Affine transformation mapping pixel `(col, row)` to geographic `(lon, lat)`:
///
/// ```text
/// lon = a * col + b * row + c
/// lat = d * col + e * row + f
/// ```
///
/// The coefficient order matches the common `Affine(a, b, c, d, e, f)`
/// convention. For north-up rasters `b` and `d` are 0 and `e` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    /// Create a transform from its six coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform with origin `(origin_lon, origin_lat)` and the given pixel size.
    pub fn north_up(origin_lon: f64, origin_lat: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, origin_lon, 0.0, pixel_height, origin_lat)
    }

    /// Map pixel coordinates to geographic coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Map geographic coordinates back to fractional pixel coordinates.
    ///
    /// Returns NaN coordinates for a degenerate transform.
    pub fn apply_inverse(&self, lon: f64, lat: f64) -> (f64, f64) {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON * f64::EPSILON {
            return (f64::NAN, f64::NAN);
        }

        let dx = lon - self.c;
        let dy = lat - self.f;

        let col = (self.e * dx - self.b * dy) / det;
        let row = (-self.d * dx + self.a * dy) / det;

        (col, row)
    }

    /// The six coefficients in `(a, b, c, d, e, f)` order.
    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        let t = Affine::north_up(10.0, 50.0, 0.5, -0.25);
        assert_eq!(t.apply(0.0, 0.0), (10.0, 50.0));
        assert_eq!(t.apply(2.0, 4.0), (11.0, 49.0));
    }

    #[test]
    fn test_inverse() {
        let t = Affine::north_up(-180.0, 60.0, 1.0 / 1200.0, -1.0 / 1200.0);
        let (col, row) = t.apply_inverse(-179.5, 59.0);
        assert!((col - 600.0).abs() < 1e-9);
        assert!((row - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate() {
        let t = Affine::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let (col, row) = t.apply_inverse(1.0, 1.0);
        assert!(col.is_nan() && row.is_nan());
    }
}
