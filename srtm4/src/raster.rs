//! In-memory rasters and the [`RasterSource`] abstraction read by the mosaic merger.

use crate::affine::Affine;
use crate::align::RasterShape;
use crate::bounds::Bounds;
use crate::error::{Result, SrtmError};
use crate::window::PixelWindow;

/// Numeric pixel type of a raster.
pub trait Sample: Copy + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Convert from a double, saturating for integer types.
    fn from_f64(value: f64) -> Self;

    /// Convert to a double.
    fn to_f64(self) -> f64;

    /// Whether this value is the `nodata` sentinel. NaN matches NaN.
    fn is_nodata(self, nodata: Self) -> bool {
        if nodata.to_f64().is_nan() {
            self.to_f64().is_nan()
        } else {
            self == nodata
        }
    }
}

impl Sample for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Sample for i16 {
    fn from_f64(value: f64) -> Self {
        value as i16
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// Owned two-dimensional raster stored in row-major order (north to south, west to east).
#[derive(Debug, Clone, PartialEq)]
pub struct Array2<T> {
    data: Vec<T>,
    shape: RasterShape,
}

impl<T: Sample> Array2<T> {
    /// Raster of the given shape with every pixel set to `value`.
    pub fn filled(shape: RasterShape, value: T) -> Self {
        Self {
            data: vec![value; shape.len()],
            shape,
        }
    }

    /// Wrap row-major data.
    pub fn from_vec(shape: RasterShape, data: Vec<T>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(SrtmError::GridMisalignment {
                reason: format!(
                    "{} values cannot fill a {}x{} raster",
                    data.len(),
                    shape.rows,
                    shape.cols
                ),
            });
        }
        Ok(Self { data, shape })
    }

    /// Raster built by evaluating `f(row, col)` for every pixel.
    pub fn from_fn(shape: RasterShape, f: impl Fn(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(shape.len());
        for row in 0..shape.rows {
            for col in 0..shape.cols {
                data.push(f(row, col));
            }
        }
        Self { data, shape }
    }

    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape.rows
    }

    pub fn cols(&self) -> usize {
        self.shape.cols
    }

    /// Pixel value, or `None` outside the raster.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row < self.shape.rows && col < self.shape.cols {
            Some(self.data[row * self.shape.cols + col])
        } else {
            None
        }
    }

    /// Mutable pixel reference, or `None` outside the raster.
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut T> {
        if row < self.shape.rows && col < self.shape.cols {
            Some(&mut self.data[row * self.shape.cols + col])
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// One row as a slice.
    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.shape.cols;
        &self.data[start..start + self.shape.cols]
    }

    /// Copy out a window. The window is clipped to the raster first.
    pub fn window(&self, window: &PixelWindow) -> Self {
        let w = window.clip(self.shape.rows, self.shape.cols);
        let shape = RasterShape::new(w.height as usize, w.width as usize);
        let mut data = Vec::with_capacity(shape.len());
        for row in w.row as usize..(w.row + w.height) as usize {
            let start = row * self.shape.cols + w.col as usize;
            data.extend_from_slice(&self.data[start..start + w.width as usize]);
        }
        Self { data, shape }
    }

    /// Convert every pixel to another sample type.
    pub fn map<U: Sample>(&self, f: impl Fn(T) -> U) -> Array2<U> {
        Array2 {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape,
        }
    }

    /// Concatenate rasters left to right. All parts must have the same row count.
    pub fn hstack(parts: &[&Array2<T>]) -> Result<Self> {
        let rows = parts.first().map(|p| p.rows()).unwrap_or(0);
        if let Some(bad) = parts.iter().find(|p| p.rows() != rows) {
            return Err(SrtmError::GridMisalignment {
                reason: format!("cannot stack {} rows next to {} rows", bad.rows(), rows),
            });
        }

        let cols = parts.iter().map(|p| p.cols()).sum();
        let shape = RasterShape::new(rows, cols);
        let mut data = Vec::with_capacity(shape.len());
        for row in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(row));
            }
        }
        Ok(Self { data, shape })
    }
}

/// A georeferenced single-band raster that can be read window by window.
///
/// The transform is whatever the raster declares; the mosaic merger treats
/// its origin as the centre of the first pixel.
pub trait RasterSource {
    /// Georeferencing transform of the raster.
    fn transform(&self) -> Affine;

    /// Size of the raster.
    fn shape(&self) -> RasterShape;

    /// Nodata sentinel, if any.
    fn nodata(&self) -> Option<f32>;

    /// Read a window of band 1. The window must lie within the raster.
    fn read_window(&self, window: &PixelWindow) -> Result<Array2<f32>>;

    /// Extent covered by `shape` pixels from the transform's origin.
    fn bounds(&self) -> Bounds {
        let t = self.transform();
        let shape = self.shape();
        let (x0, y0) = t.apply(0.0, 0.0);
        let (x1, y1) = t.apply(shape.cols as f64, shape.rows as f64);
        Bounds::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// A [`RasterSource`] backed by an in-memory array.
#[derive(Debug, Clone)]
pub struct MemRaster {
    data: Array2<f32>,
    transform: Affine,
    nodata: Option<f32>,
}

impl MemRaster {
    pub fn new(data: Array2<f32>, transform: Affine, nodata: Option<f32>) -> Self {
        Self {
            data,
            transform,
            nodata,
        }
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }
}

impl RasterSource for MemRaster {
    fn transform(&self) -> Affine {
        self.transform
    }

    fn shape(&self) -> RasterShape {
        self.data.shape()
    }

    fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    fn read_window(&self, window: &PixelWindow) -> Result<Array2<f32>> {
        Ok(self.data.window(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Array2<f32> {
        Array2::from_fn(RasterShape::new(3, 4), |r, c| (r * 10 + c) as f32)
    }

    #[test]
    fn test_from_vec_checks_len() {
        assert!(Array2::from_vec(RasterShape::new(2, 2), vec![0.0f32; 3]).is_err());
        assert!(Array2::from_vec(RasterShape::new(2, 2), vec![0.0f32; 4]).is_ok());
    }

    #[test]
    fn test_get() {
        let a = sample();
        assert_eq!(a.get(2, 3), Some(23.0));
        assert_eq!(a.get(3, 0), None);
        assert_eq!(a.row(1), &[10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_window() {
        let a = sample();
        let w = a.window(&PixelWindow::new(1, 1, 2, 2));
        assert_eq!(w.as_slice(), &[11.0, 12.0, 21.0, 22.0]);

        let clipped = a.window(&PixelWindow::new(3, 2, 5, 5));
        assert_eq!(clipped.as_slice(), &[23.0]);
    }

    #[test]
    fn test_hstack() {
        let left = Array2::filled(RasterShape::new(2, 1), 1.0f32);
        let right = Array2::filled(RasterShape::new(2, 2), 2.0f32);
        let joined = Array2::hstack(&[&left, &right]).unwrap();
        assert_eq!(joined.shape(), RasterShape::new(2, 3));
        assert_eq!(joined.as_slice(), &[1.0, 2.0, 2.0, 1.0, 2.0, 2.0]);

        let short = Array2::filled(RasterShape::new(1, 2), 2.0f32);
        assert!(Array2::hstack(&[&left, &short]).is_err());
    }

    #[test]
    fn test_is_nodata() {
        assert!(f32::NAN.is_nodata(f32::NAN));
        assert!(!1.0f32.is_nodata(f32::NAN));
        assert!((-32768i16).is_nodata(-32768));
        assert!(!0i16.is_nodata(-32768));
        assert!(!f64::NAN.is_nodata(0.0));
    }

    #[test]
    fn test_mem_raster_bounds() {
        let r = MemRaster::new(sample(), Affine::north_up(10.0, 5.0, 0.5, -0.5), None);
        assert_eq!(r.bounds(), Bounds::new(10.0, 3.5, 12.0, 5.0));
    }
}
