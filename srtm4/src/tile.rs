//! Reading cached SRTM tiles.
//!
//! This module provides the [`SrtmTile`] struct for reading the GeoTIFF
//! rasters extracted into the cache directory.
//!
//! # CGIAR georeferencing
//!
//! The CGIAR tiles declare `AREA_OR_POINT=Area`, but their tiepoint is in fact
//! the centre of the first sample: samples lie exactly on multiples of 3
//! arc-seconds and a 6000×6000 tile starts at its own north-west corner. The
//! tag is not touched here; readers simply treat the declared origin as a pixel
//! centre.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::affine::Affine;
use crate::align::{RasterShape, RES};
use crate::error::{Result, SrtmError};
use crate::filename::{parse_tile_name, TileId};
use crate::raster::{Array2, RasterSource};
use crate::window::PixelWindow;

/// Value indicating no data (void) in SRTM files
pub const VOID_VALUE: i16 = -32768;

/// GeoTIFF `ModelPixelScaleTag`.
pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;

/// GeoTIFF `ModelTiepointTag`.
pub(crate) const MODEL_TIEPOINT: u16 = 33922;

/// GeoTIFF `GeoKeyDirectoryTag`.
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;

/// GDAL nodata tag, stored as ASCII.
pub(crate) const GDAL_NODATA: u16 = 42113;

/// Upper bound on a single decoded strip or tile.
const CHUNK_BUFFER_LIMIT: usize = 256 * 1024 * 1024;

/// An SRTM tile on disk.
///
/// Opening a tile only reads its header. Samples are decoded on demand, one
/// strip or block at a time, for the windows that [`RasterSource::read_window`]
/// asks for.
///
/// # Example
///
/// ```ignore
/// use srtm4::SrtmTile;
///
/// let tile = SrtmTile::from_file("/home/me/.srtm/srtm_37_04.tif")?;
/// println!("{:?}", tile.bounds());
/// ```
#[derive(Debug, Clone)]
pub struct SrtmTile {
    path: PathBuf,
    shape: RasterShape,
    transform: Affine,
    nodata: Option<f32>,
    /// Strip or block size `(cols, rows)`.
    chunk: (usize, usize),
}

impl SrtmTile {
    /// Open a tile from a GeoTIFF file.
    ///
    /// The georeferencing is taken from the GeoTIFF tags. Files without them
    /// fall back to the grid position implied by their `srtm_XX_YY` name.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or its header decoded
    /// - The sample format is neither 16-bit integer nor 32-bit float
    /// - The file has no georeferencing and its name is not a tile name
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy();
        let id = parse_tile_name(&name).ok();
        Self::from_file_with_id(path, id)
    }

    /// Open a tile, using `id` for georeferencing when the file has no GeoTIFF tags.
    pub fn from_file_with_id<P: AsRef<Path>>(path: P, id: Option<TileId>) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;

        let (width, height) = decoder.dimensions()?;
        let shape = RasterShape::new(height as usize, width as usize);
        let (chunk_cols, chunk_rows) = decoder.chunk_dimensions();
        if chunk_cols == 0 || chunk_rows == 0 {
            return Err(invalid_data(format!("{}: empty strip or block size", path.display())));
        }

        let transform = match read_transform(&mut decoder) {
            Some(t) => t,
            None => match id {
                Some(id) => Affine::north_up(id.west(), id.north(), RES, -RES),
                None => {
                    return Err(invalid_data(format!(
                        "{} has no georeferencing",
                        path.display()
                    )))
                }
            },
        };

        let nodata = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f32>().ok());

        let nodata = match (decoder.colortype()?, nodata) {
            (_, Some(n)) => Some(n),
            (tiff::ColorType::Gray(16), None) => Some(VOID_VALUE as f32),
            (tiff::ColorType::Gray(32), None) => None,
            _ => {
                return Err(invalid_data(format!(
                    "{}: unsupported sample format",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            shape,
            transform,
            nodata,
            chunk: (chunk_cols as usize, chunk_rows as usize),
        })
    }

    /// Path of the GeoTIFF file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample at a pixel index, or `None` outside the tile.
    pub fn get(&self, row: usize, col: usize) -> Result<Option<f32>> {
        if row >= self.shape.rows || col >= self.shape.cols {
            return Ok(None);
        }
        let window = PixelWindow::new(col as i64, row as i64, 1, 1);
        Ok(self.read_window(&window)?.get(0, 0))
    }
}

impl RasterSource for SrtmTile {
    fn transform(&self) -> Affine {
        self.transform
    }

    fn shape(&self) -> RasterShape {
        self.shape
    }

    fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    /// Decode the strips or blocks that intersect `window` and copy the window out.
    fn read_window(&self, window: &PixelWindow) -> Result<Array2<f32>> {
        let w = window.clip(self.shape.rows, self.shape.cols);
        let out_shape = RasterShape::new(w.height as usize, w.width as usize);
        let mut out = Array2::filled(out_shape, f32::NAN);
        if w.is_empty() {
            return Ok(out);
        }

        let (row0, col0) = (w.row as usize, w.col as usize);
        let (row_end, col_end) = (row0 + out_shape.rows, col0 + out_shape.cols);
        let (chunk_cols, chunk_rows) = self.chunk;
        let chunks_across = self.shape.cols.div_ceil(chunk_cols);

        let mut decoder = open_decoder(&self.path)?;
        for chunk_row in row0 / chunk_rows..=(row_end - 1) / chunk_rows {
            for chunk_col in col0 / chunk_cols..=(col_end - 1) / chunk_cols {
                let index = (chunk_row * chunks_across + chunk_col) as u32;
                let (data_cols, _) = decoder.chunk_data_dimensions(index);
                let samples = chunk_samples(decoder.read_chunk(index)?, &self.path)?;

                let (top, left) = (chunk_row * chunk_rows, chunk_col * chunk_cols);
                let rows = top.max(row0)..(top + chunk_rows).min(row_end);
                let cols = left.max(col0)..(left + chunk_cols).min(col_end);

                for row in rows {
                    let src = (row - top) * data_cols as usize;
                    for col in cols.clone() {
                        if let (Some(&value), Some(pixel)) =
                            (samples.get(src + col - left), out.get_mut(row - row0, col - col0))
                        {
                            *pixel = value;
                        }
                    }
                }
            }
        }

        Ok(out)
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = BufReader::new(File::open(path)?);

    // Single-strip tiles hold all 6000 × 6000 samples in one chunk
    let mut limits = Limits::default();
    limits.decoding_buffer_size = CHUNK_BUFFER_LIMIT;
    limits.intermediate_buffer_size = CHUNK_BUFFER_LIMIT;
    Ok(Decoder::new(file)?.with_limits(limits))
}

/// Widen a decoded chunk to `f32`.
fn chunk_samples(result: DecodingResult, path: &Path) -> Result<Vec<f32>> {
    match result {
        DecodingResult::I16(v) => Ok(v.into_iter().map(f32::from).collect()),
        DecodingResult::F32(v) => Ok(v),
        _ => Err(invalid_data(format!(
            "{}: unsupported sample format",
            path.display()
        ))),
    }
}

/// Read the origin and pixel size from `ModelTiepoint` and `ModelPixelScale`.
fn read_transform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<Affine> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).ok()?;

    if tiepoint.len() < 6 || scale.len() < 2 {
        return None;
    }

    // Tiepoint format: [i, j, k, x, y, z], raster (i, j) maps to model (x, y)
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);

    Some(Affine::north_up(x - i * sx, y + j * sy, sx, -sy))
}

fn invalid_data(reason: String) -> SrtmError {
    SrtmError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::write_geotiff;
    use crate::raster::Sample;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    #[test]
    fn test_roundtrip_georeferencing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("srtm_37_04.tif");
        let data = Array2::from_fn(RasterShape::new(4, 5), |r, c| (r * 5 + c) as f32);
        let transform = Affine::north_up(0.0, 45.0, RES, -RES);
        write_geotiff(&path, &data, &transform, f32::NAN).unwrap();

        let tile = SrtmTile::from_file(&path).unwrap();
        assert_eq!(tile.shape(), RasterShape::new(4, 5));
        assert_eq!(tile.transform(), transform);
        assert!(tile.nodata().unwrap().is_nan());
        assert_eq!(tile.get(3, 4).unwrap(), Some(19.0));
        assert_eq!(tile.get(4, 0).unwrap(), None);

        let win = tile.read_window(&PixelWindow::new(1, 2, 2, 2)).unwrap();
        assert_eq!(win.as_slice(), &[11.0, 12.0, 16.0, 17.0]);
    }

    #[test]
    fn test_without_tags_uses_tile_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("srtm_38_03.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            let samples: Vec<f32> = vec![100.0, 200.0, 300.0, 400.0];
            encoder
                .write_image::<colortype::Gray32Float>(2, 2, &samples)
                .unwrap();
        }

        let tile = SrtmTile::from_file(&path).unwrap();
        let id = TileId::new(38, 3).unwrap();
        assert_eq!(
            tile.transform(),
            Affine::north_up(id.west(), id.north(), RES, -RES)
        );
        assert_eq!(tile.nodata(), None);
        assert_eq!(tile.get(1, 0).unwrap(), Some(300.0));
    }

    #[test]
    fn test_window_spans_strips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("srtm_37_04.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            let mut samples: Vec<i16> = (0..15).collect();
            samples[7] = VOID_VALUE;
            let mut image = encoder.new_image::<colortype::GrayI16>(3, 5).unwrap();
            image.rows_per_strip(2).unwrap();
            image.write_data(&samples).unwrap();
        }

        let tile = SrtmTile::from_file(&path).unwrap();
        assert_eq!(tile.shape(), RasterShape::new(5, 3));
        assert_eq!(tile.nodata(), Some(VOID_VALUE as f32));

        // Rows 1..4 cross a strip boundary
        let win = tile.read_window(&PixelWindow::new(1, 1, 2, 3)).unwrap();
        assert_eq!(win.as_slice(), &[4.0, 5.0, -32768.0, 8.0, 10.0, 11.0]);

        // Clipped to the raster
        let win = tile.read_window(&PixelWindow::new(2, 4, 5, 5)).unwrap();
        assert_eq!(win.as_slice(), &[14.0]);
    }

    #[test]
    fn test_without_tags_or_tile_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            encoder
                .write_image::<colortype::Gray32Float>(1, 1, &[1.0f32])
                .unwrap();
        }

        let err = SrtmTile::from_file(&path).err().unwrap();
        assert!(err.to_string().contains("no georeferencing"));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = SrtmTile::from_file(dir.path().join("srtm_01_01.tif"))
            .err()
            .unwrap();
        assert!(matches!(err, SrtmError::Io(_)));
    }

    #[test]
    fn test_custom_nodata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.tif");
        let data = Array2::filled(RasterShape::new(2, 2), -9999.0f32);
        write_geotiff(&path, &data, &Affine::north_up(1.0, 1.0, RES, -RES), -9999.0).unwrap();

        let tile = SrtmTile::from_file(&path).unwrap();
        let nodata = tile.nodata().unwrap();
        assert!(tile.get(0, 0).unwrap().unwrap().is_nodata(nodata));
    }
}
