//! Compositing several source rasters into one destination grid.
//!
//! Sources are visited in order and only fill pixels that are still nodata, so
//! the first source covering a pixel wins. Only the window of each source that
//! overlaps the destination is read.

use crate::affine::Affine;
use crate::align::RasterShape;
use crate::bounds::Bounds;
use crate::error::Result;
use crate::raster::{Array2, RasterSource, Sample};
use crate::window::{intersect_bounds, pixel_window, PixelWindow};

/// Extent of the destination expressed on pixel centres, far edge exclusive.
///
/// With a pixel-is-area `transform` this runs from the centre of the first
/// pixel to one pixel past the centre of the last one, which is the same
/// convention the source tiles declare.
pub fn destination_bounds(transform: &Affine, shape: RasterShape) -> Bounds {
    let (w, n) = transform.apply(0.5, 0.5);
    let (e, s) = transform.apply(shape.cols as f64 + 0.5, shape.rows as f64 + 0.5);
    Bounds::new(w.min(e), s.min(n), w.max(e), s.max(n))
}

/// Merge multiple sources into a new array.
///
/// # Arguments
///
/// * `sources` - Opened rasters, in order of precedence
/// * `transform` - Pixel-is-area transform of the destination
/// * `shape` - Destination `(rows, cols)`
/// * `nodata` - Value of pixels that no source covers
///
/// # Errors
///
/// Returns [`crate::SrtmError::GridMisalignment`] if a source is not on the
/// destination's pixel grid.
pub fn merge<T: Sample>(
    sources: &[&dyn RasterSource],
    transform: &Affine,
    shape: RasterShape,
    nodata: T,
) -> Result<Array2<T>> {
    let mut dst = Array2::filled(shape, nodata);
    let dst_bounds = destination_bounds(transform, shape);

    for source in sources {
        let intersection = match intersect_bounds(&dst_bounds, &source.bounds())? {
            Some(b) => b,
            None => continue, // empty intersection, skip
        };

        let src_shape = source.shape();
        let dst_win = pixel_window(&intersection, transform, true)?.clip(shape.rows, shape.cols);
        let src_win = pixel_window(&intersection, &source.transform(), false)?
            .clip(src_shape.rows, src_shape.cols);

        let width = dst_win.width.min(src_win.width);
        let height = dst_win.height.min(src_win.height);
        if width <= 0 || height <= 0 {
            continue;
        }

        let src_win = PixelWindow::new(src_win.col, src_win.row, width, height);
        let tmp = source.read_window(&src_win)?;

        copy_valid(&mut dst, &tmp, dst_win.row as usize, dst_win.col as usize, nodata, source.nodata());
    }

    Ok(dst)
}

/// Copy `src` into `dst` at `(row0, col0)` where `dst` is nodata and `src` holds a value.
fn copy_valid<T: Sample>(
    dst: &mut Array2<T>,
    src: &Array2<f32>,
    row0: usize,
    col0: usize,
    dst_nodata: T,
    src_nodata: Option<f32>,
) {
    for row in 0..src.rows() {
        for (col, &value) in src.row(row).iter().enumerate() {
            if value.is_nan() || src_nodata.is_some_and(|n| value.is_nodata(n)) {
                continue;
            }
            if let Some(pixel) = dst.get_mut(row0 + row, col0 + col) {
                if pixel.is_nodata(dst_nodata) {
                    *pixel = T::from_f64(value as f64);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{align_to_grid, RES};
    use crate::raster::MemRaster;

    /// A source of `rows × cols` samples with the first sample centred at `(lon, lat)`.
    fn source(lon: f64, lat: f64, rows: usize, cols: usize, value: f32) -> MemRaster {
        MemRaster::new(
            Array2::filled(RasterShape::new(rows, cols), value),
            Affine::north_up(lon, lat, RES, -RES),
            Some(-32768.0),
        )
    }

    #[test]
    fn test_single_source_full_cover() {
        let grid = align_to_grid(&Bounds::new(0.0, 0.0, 10.0 * RES, 5.0 * RES));
        let src = source(-10.0 * RES, 20.0 * RES, 40, 40, 7.0);

        let out: Array2<f32> = merge(&[&src], &grid.transform, grid.shape, f32::NAN).unwrap();
        assert_eq!(out.shape(), RasterShape::new(6, 11));
        assert!(out.as_slice().iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_partial_cover_leaves_nodata() {
        let grid = align_to_grid(&Bounds::new(0.0, 0.0, 9.0 * RES, 9.0 * RES));
        // Covers columns 5.. and rows 0..
        let src = source(5.0 * RES, 9.0 * RES, 20, 20, 3.0);

        let out: Array2<f32> = merge(&[&src], &grid.transform, grid.shape, f32::NAN).unwrap();
        assert!(out.get(0, 4).unwrap().is_nan());
        assert_eq!(out.get(0, 5), Some(3.0));
        assert_eq!(out.get(9, 9), Some(3.0));
    }

    #[test]
    fn test_first_source_wins() {
        let grid = align_to_grid(&Bounds::new(0.0, 0.0, 9.0 * RES, 9.0 * RES));
        let a = source(0.0, 9.0 * RES, 10, 10, 1.0);
        let b = source(0.0, 9.0 * RES, 10, 10, 2.0);

        let ab: Array2<f32> = merge(&[&a, &b], &grid.transform, grid.shape, f32::NAN).unwrap();
        assert!(ab.as_slice().iter().all(|&v| v == 1.0));

        let ba: Array2<f32> = merge(&[&b, &a], &grid.transform, grid.shape, f32::NAN).unwrap();
        assert!(ba.as_slice().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_source_nodata_is_filled_by_later_source() {
        let grid = align_to_grid(&Bounds::new(0.0, 0.0, 3.0 * RES, 3.0 * RES));
        let mut holes = Array2::filled(RasterShape::new(4, 4), 1.0f32);
        *holes.get_mut(1, 1).unwrap() = -32768.0;
        *holes.get_mut(2, 2).unwrap() = f32::NAN;
        let a = MemRaster::new(holes, Affine::north_up(0.0, 3.0 * RES, RES, -RES), Some(-32768.0));
        let b = source(0.0, 3.0 * RES, 4, 4, 2.0);

        let out: Array2<f32> = merge(&[&a, &b], &grid.transform, grid.shape, f32::NAN).unwrap();
        assert_eq!(out.get(0, 0), Some(1.0));
        assert_eq!(out.get(1, 1), Some(2.0));
        assert_eq!(out.get(2, 2), Some(2.0));
    }

    #[test]
    fn test_disjoint_source_skipped() {
        let grid = align_to_grid(&Bounds::new(0.0, 0.0, 3.0 * RES, 3.0 * RES));
        let far = source(1.0, 1.0, 4, 4, 5.0);

        let out: Array2<f32> = merge(&[&far], &grid.transform, grid.shape, -9999.0).unwrap();
        assert!(out.as_slice().iter().all(|&v| v == -9999.0));
    }

    #[test]
    fn test_integer_destination() {
        let grid = align_to_grid(&Bounds::new(0.0, 0.0, 2.0 * RES, 2.0 * RES));
        let src = source(0.0, 2.0 * RES, 3, 3, 12.0);

        let out: Array2<i16> = merge(&[&src], &grid.transform, grid.shape, -32768).unwrap();
        assert!(out.as_slice().iter().all(|&v| v == 12));
    }

    #[test]
    fn test_misaligned_source() {
        let grid = align_to_grid(&Bounds::new(0.0, 0.0, 3.0 * RES, 3.0 * RES));
        let shifted = source(0.3 * RES, 3.0 * RES, 4, 4, 1.0);
        assert!(merge::<f32>(&[&shifted], &grid.transform, grid.shape, f32::NAN).is_err());
    }
}
