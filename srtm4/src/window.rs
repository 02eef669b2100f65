//! Mapping geographic rectangles to integer pixel windows.

use crate::affine::Affine;
use crate::bounds::{intersect_interval, Bounds};
use crate::error::{Result, SrtmError};

/// Maximum rounding error, in pixels, tolerated when converting to a window.
pub const ROUNDING_TOLERANCE: f64 = 1e-2;

/// Integer pixel window `(col, row, width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: i64,
    pub row: i64,
    pub width: i64,
    pub height: i64,
}

impl PixelWindow {
    pub fn new(col: i64, row: i64, width: i64, height: i64) -> Self {
        Self {
            col,
            row,
            width,
            height,
        }
    }

    /// Whether the window covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Clip the window to a raster of `rows × cols` pixels.
    pub fn clip(&self, rows: usize, cols: usize) -> Self {
        let col = self.col.max(0);
        let row = self.row.max(0);
        let col_end = (self.col + self.width).min(cols as i64);
        let row_end = (self.row + self.height).min(rows as i64);
        Self::new(col, row, (col_end - col).max(0), (row_end - row).max(0))
    }
}

/// Intersect two bounds axis by axis.
///
/// Returns `Ok(None)` when either axis has an empty intersection.
pub fn intersect_bounds(one: &Bounds, other: &Bounds) -> Result<Option<Bounds>> {
    let lon = intersect_interval(one.lon_interval(), other.lon_interval())?;
    let lat = intersect_interval(one.lat_interval(), other.lat_interval())?;

    Ok(match (lon, lat) {
        (Some((lon_min, lon_max)), Some((lat_min, lat_max))) => {
            Some(Bounds::new(lon_min, lat_min, lon_max, lat_max))
        }
        _ => None,
    })
}

/// Round to the nearest integer, failing if the value is not close to one.
pub fn round_checked(value: f64, eps: f64) -> Result<i64> {
    let rounded = value.round();
    if !((rounded - value).abs() < eps) {
        return Err(SrtmError::GridMisalignment {
            reason: format!("rounding {} to {} exceeds {} px", value, rounded, eps),
        });
    }
    Ok(rounded as i64)
}

/// Get the pixel window of geographic bounds in a raster with `transform`.
///
/// `origin_is_area` tells whether the transform's origin is the upper-left
/// corner of the first pixel (pixel-is-area) or its centre. For an area
/// transform the window is shifted by half a pixel so that bounds expressed on
/// pixel centres land on whole pixel indices.
///
/// Fails with [`SrtmError::GridMisalignment`] when the bounds do not fall on the
/// raster's pixel grid.
pub fn pixel_window(bounds: &Bounds, transform: &Affine, origin_is_area: bool) -> Result<PixelWindow> {
    let (col_a, row_a) = transform.apply_inverse(bounds.lon_min, bounds.lat_max);
    let (col_b, row_b) = transform.apply_inverse(bounds.lon_max, bounds.lat_min);

    let col_off = col_a.min(col_b);
    let row_off = row_a.min(row_b);
    let width = (col_b - col_a).abs();
    let height = (row_b - row_a).abs();

    let off = if origin_is_area { 0.5 } else { 0.0 };

    Ok(PixelWindow::new(
        round_checked(col_off - off, ROUNDING_TOLERANCE)?,
        round_checked(row_off - off, ROUNDING_TOLERANCE)?,
        round_checked(width, ROUNDING_TOLERANCE)?,
        round_checked(height, ROUNDING_TOLERANCE)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{align_to_grid, RES};

    #[test]
    fn test_intersect_bounds() {
        let a = Bounds::new(0.0, 0.0, 2.0, 2.0);
        let b = Bounds::new(1.0, -1.0, 3.0, 1.5);
        assert_eq!(
            intersect_bounds(&a, &b).unwrap(),
            Some(Bounds::new(1.0, 0.0, 2.0, 1.5))
        );
    }

    #[test]
    fn test_intersect_bounds_disjoint() {
        let a = Bounds::new(0.0, 0.0, 1.0, 1.0);
        let b = Bounds::new(0.5, 2.0, 3.0, 3.0);
        assert_eq!(intersect_bounds(&a, &b).unwrap(), None);
    }

    #[test]
    fn test_intersect_bounds_invalid() {
        let a = Bounds::new(1.0, 0.0, 0.0, 1.0);
        let b = Bounds::new(0.0, 0.0, 1.0, 1.0);
        assert!(intersect_bounds(&a, &b).is_err());
    }

    #[test]
    fn test_round_checked() {
        assert_eq!(round_checked(2.004, 1e-2).unwrap(), 2);
        assert_eq!(round_checked(1.996, 1e-2).unwrap(), 2);
        assert!(round_checked(2.3, 1e-2).is_err());
        assert!(round_checked(1.7, 1e-2).is_err());
    }

    #[test]
    fn test_point_window() {
        // Transform whose origin is the centre of the first sample
        let t = Affine::north_up(5.0, 50.0, RES, -RES);
        let bounds = Bounds::new(5.0 + 10.0 * RES, 50.0 - 30.0 * RES, 5.0 + 20.0 * RES, 50.0 - 25.0 * RES);
        let w = pixel_window(&bounds, &t, false).unwrap();
        assert_eq!(w, PixelWindow::new(10, 25, 10, 5));
    }

    #[test]
    fn test_area_window_of_aligned_grid() {
        let grid = align_to_grid(&Bounds::new(1.0, 1.0, 1.01, 1.02));
        // Pixel-centre extent with an exclusive far edge
        let (w, n) = grid.transform.apply(0.5, 0.5);
        let (e, s) = grid
            .transform
            .apply(grid.shape.cols as f64 + 0.5, grid.shape.rows as f64 + 0.5);
        let win = pixel_window(&Bounds::new(w, s, e, n), &grid.transform, true).unwrap();
        assert_eq!(
            win,
            PixelWindow::new(0, 0, grid.shape.cols as i64, grid.shape.rows as i64)
        );
    }

    #[test]
    fn test_misaligned_window() {
        let t = Affine::north_up(5.0, 50.0, RES, -RES);
        let bounds = Bounds::new(5.0 + 0.4 * RES, 49.0, 5.5, 50.0);
        let err = pixel_window(&bounds, &t, false).unwrap_err();
        assert!(matches!(err, SrtmError::GridMisalignment { .. }));
    }

    #[test]
    fn test_clip() {
        let w = PixelWindow::new(-2, 3, 10, 10).clip(8, 5);
        assert_eq!(w, PixelWindow::new(0, 3, 5, 5));
        assert!(PixelWindow::new(6, 0, 2, 2).clip(4, 4).is_empty());
    }
}
