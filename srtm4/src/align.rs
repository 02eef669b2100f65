//! Snapping arbitrary bounds onto the SRTM pixel grid.
//!
//! SRTM samples are points: the pixel centres of the 3 arc-second grid lie on
//! exact multiples of the resolution. A crop's bounds are therefore expanded
//! outwards to the nearest sample lines, and both end samples are included in
//! the output. The resulting transform uses the pixel-is-area convention, so its
//! origin sits half a pixel up and to the left of the first sample.

use crate::affine::Affine;
use crate::bounds::Bounds;

/// SRTM 90m resolution in degrees (3 arc-seconds).
pub const RES: f64 = 3.0 / 3600.0;

/// Fraction of a pixel under which a coordinate is considered on a grid line.
const SNAP_EPSILON: f64 = 1e-6;

/// Shape of a raster as `(rows, cols)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterShape {
    pub rows: usize,
    pub cols: usize,
}

impl RasterShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether the shape has no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounds snapped onto the sample grid, with the matching transform and shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedGrid {
    /// Bounds whose edges lie on sample centres.
    pub bounds: Bounds,
    /// Pixel-is-area transform of the output raster.
    pub transform: Affine,
    /// Output shape, inclusive of both edge samples.
    pub shape: RasterShape,
}

/// Regular sample grid with a fixed resolution anchored at 0°.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    res: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { res: RES }
    }
}

impl GridSpec {
    /// Grid with a custom resolution in degrees.
    pub fn with_resolution(res: f64) -> Self {
        Self { res }
    }

    /// Resolution in degrees.
    pub fn res(&self) -> f64 {
        self.res
    }

    /// Index of the grid line at or below `value`.
    fn floor_index(&self, value: f64) -> i64 {
        let q = value / self.res;
        let nearest = q.round();
        if (q - nearest).abs() < SNAP_EPSILON {
            nearest as i64
        } else {
            q.floor() as i64
        }
    }

    /// Index of the grid line at or above `value`.
    fn ceil_index(&self, value: f64) -> i64 {
        let q = value / self.res;
        let nearest = q.round();
        if (q - nearest).abs() < SNAP_EPSILON {
            nearest as i64
        } else {
            q.ceil() as i64
        }
    }

    /// Adjust bounds to fall exactly onto the pixel grid.
    ///
    /// Minimum edges snap down and maximum edges snap up, so the aligned bounds
    /// always contain the input. The last row and column are part of the image,
    /// hence `shape = (row_max - row_min + 1, col_max - col_min + 1)`.
    ///
    /// ```
    /// use srtm4::align::{GridSpec, RES};
    /// use srtm4::bounds::Bounds;
    ///
    /// let grid = GridSpec::default().align(&Bounds::new(0.0, 0.0, 1.0, 1.0));
    /// assert_eq!(grid.shape.cols, 1201);
    /// assert_eq!(grid.transform.c, -RES / 2.0);
    /// ```
    pub fn align(&self, bounds: &Bounds) -> AlignedGrid {
        let col_min = self.floor_index(bounds.lon_min);
        let col_max = self.ceil_index(bounds.lon_max);
        let row_min = self.floor_index(bounds.lat_min);
        let row_max = self.ceil_index(bounds.lat_max);

        let aligned = Bounds::new(
            self.res * col_min as f64,
            self.res * row_min as f64,
            self.res * col_max as f64,
            self.res * row_max as f64,
        );

        // Translate by half a pixel for the pixel-is-area transform (upper left corner)
        let transform = Affine::north_up(
            aligned.lon_min - self.res / 2.0,
            aligned.lat_max + self.res / 2.0,
            self.res,
            -self.res,
        );

        let shape = RasterShape::new(
            (row_max - row_min + 1).max(0) as usize,
            (col_max - col_min + 1).max(0) as usize,
        );

        AlignedGrid {
            bounds: aligned,
            transform,
            shape,
        }
    }
}

/// Align bounds on the default SRTM 3 arc-second grid.
pub fn align_to_grid(bounds: &Bounds) -> AlignedGrid {
    GridSpec::default().align(bounds)
}
