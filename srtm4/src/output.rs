//! Writing crops as GeoTIFF files.
//!
//! Crops are written as internally tiled GeoTIFFs: 256 × 256 blocks,
//! deflate-compressed, with the floating-point predictor so that smooth
//! terrain compresses well.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use rayon::prelude::*;
use tiff::encoder::TiffEncoder;
use tiff::tags::{
    CompressionMethod, PhotometricInterpretation, PlanarConfiguration, Predictor, SampleFormat,
    Tag,
};

use crate::affine::Affine;
use crate::error::{Result, SrtmError};
use crate::raster::Array2;
use crate::service::Mosaic;
use crate::tile::{GDAL_NODATA, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE, MODEL_TIEPOINT};

/// Width and height of an internal block.
pub const BLOCK_SIZE: usize = 256;

/// GeoKey directory: geographic model, pixel-is-area, EPSG:4326.
const WGS84_GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, // header: version, revision, minor, key count
    1024, 0, 1, 2, // GTModelTypeGeoKey = ModelTypeGeographic
    1025, 0, 1, 1, // GTRasterTypeGeoKey = RasterPixelIsArea
    2048, 0, 1, 4326, // GeographicTypeGeoKey = WGS 84
];

/// Write a single-band `f32` raster as a tiled, deflate-compressed GeoTIFF.
///
/// The transform origin is stored as the tiepoint of pixel `(0, 0)`. Edge
/// blocks are padded with `nodata`.
///
/// # Errors
///
/// Returns an error if the transform is rotated or the file cannot be written.
pub fn write_geotiff<P: AsRef<Path>>(
    path: P,
    data: &Array2<f32>,
    transform: &Affine,
    nodata: f32,
) -> Result<()> {
    if transform.b != 0.0 || transform.d != 0.0 {
        return Err(SrtmError::GridMisalignment {
            reason: "rotated transforms cannot be written as GeoTIFF tiepoints".to_string(),
        });
    }

    let blocks_down = data.rows().div_ceil(BLOCK_SIZE);
    let blocks_across = data.cols().div_ceil(BLOCK_SIZE);

    let blocks: Vec<Vec<u8>> = (0..blocks_down * blocks_across)
        .into_par_iter()
        .map(|i| {
            let (row0, col0) = ((i / blocks_across) * BLOCK_SIZE, (i % blocks_across) * BLOCK_SIZE);
            compress_block(data, row0, col0, nodata)
        })
        .collect::<std::io::Result<_>>()?;

    let file = File::create(path.as_ref())?;
    let mut encoder = TiffEncoder::new(file)?;
    let mut dir = encoder.new_directory()?;

    let mut offsets = Vec::with_capacity(blocks.len());
    let mut byte_counts = Vec::with_capacity(blocks.len());
    for block in &blocks {
        offsets.push(to_u32(dir.write_data(&block[..])?)?);
        byte_counts.push(to_u32(block.len() as u64)?);
    }

    let nodata_text = if nodata.is_nan() {
        "nan".to_string()
    } else {
        nodata.to_string()
    };

    dir.write_tag(Tag::ImageWidth, data.cols() as u32)?;
    dir.write_tag(Tag::ImageLength, data.rows() as u32)?;
    dir.write_tag(Tag::BitsPerSample, 32u16)?;
    dir.write_tag(Tag::Compression, CompressionMethod::Deflate.to_u16())?;
    dir.write_tag(
        Tag::PhotometricInterpretation,
        PhotometricInterpretation::BlackIsZero.to_u16(),
    )?;
    dir.write_tag(Tag::SamplesPerPixel, 1u16)?;
    dir.write_tag(Tag::PlanarConfiguration, PlanarConfiguration::Chunky.to_u16())?;
    dir.write_tag(Tag::Predictor, Predictor::FloatingPoint.to_u16())?;
    dir.write_tag(Tag::TileWidth, BLOCK_SIZE as u32)?;
    dir.write_tag(Tag::TileLength, BLOCK_SIZE as u32)?;
    dir.write_tag(Tag::TileOffsets, &offsets[..])?;
    dir.write_tag(Tag::TileByteCounts, &byte_counts[..])?;
    dir.write_tag(Tag::SampleFormat, SampleFormat::IEEEFP.to_u16())?;
    dir.write_tag(
        Tag::Unknown(MODEL_PIXEL_SCALE),
        &[transform.a, -transform.e, 0.0][..],
    )?;
    dir.write_tag(
        Tag::Unknown(MODEL_TIEPOINT),
        &[0.0, 0.0, 0.0, transform.c, transform.f, 0.0][..],
    )?;
    dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &WGS84_GEO_KEYS[..])?;
    dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata_text.as_str())?;
    dir.finish()?;

    tracing::debug!(
        path = %path.as_ref().display(),
        rows = data.rows(),
        cols = data.cols(),
        blocks = blocks.len(),
        "Wrote GeoTIFF"
    );

    Ok(())
}

/// Write a crop to a GeoTIFF file.
pub fn write_mosaic<P: AsRef<Path>>(path: P, mosaic: &Mosaic) -> Result<()> {
    write_geotiff(path, &mosaic.data, &mosaic.transform, mosaic.nodata)
}

/// Encode one block with the floating-point predictor and deflate it.
///
/// Each row's samples are split into big-endian byte planes, then
/// differenced byte by byte from the end of the row.
fn compress_block(
    data: &Array2<f32>,
    row0: usize,
    col0: usize,
    nodata: f32,
) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    let mut row_bytes = vec![0u8; 4 * BLOCK_SIZE];

    for row in row0..row0 + BLOCK_SIZE {
        for i in 0..BLOCK_SIZE {
            let value = data.get(row, col0 + i).unwrap_or(nodata);
            for (plane, byte) in value.to_be_bytes().into_iter().enumerate() {
                row_bytes[plane * BLOCK_SIZE + i] = byte;
            }
        }
        for j in (1..row_bytes.len()).rev() {
            row_bytes[j] = row_bytes[j].wrapping_sub(row_bytes[j - 1]);
        }
        encoder.write_all(&row_bytes)?;
    }

    encoder.finish()
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        SrtmError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("offset {} does not fit a classic TIFF", value),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{RasterShape, RES};
    use crate::raster::RasterSource;
    use crate::tile::SrtmTile;
    use crate::window::PixelWindow;
    use std::io::BufReader;
    use tempfile::TempDir;
    use tiff::decoder::{ChunkType, Decoder};

    #[test]
    fn test_write_tiled_with_predictor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crop.tif");
        let data = Array2::from_fn(RasterShape::new(600, 7), |r, c| (r * 7 + c) as f32);
        let transform = Affine::north_up(10.0 - RES / 2.0, 20.0 + RES / 2.0, RES, -RES);

        write_geotiff(&path, &data, &transform, f32::NAN).unwrap();

        let mut decoder = Decoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
        assert_eq!(decoder.get_chunk_type(), ChunkType::Tile);
        assert_eq!(decoder.chunk_dimensions(), (256, 256));
        assert_eq!(decoder.tile_count().unwrap(), 3);
        assert_eq!(decoder.get_tag_u32(Tag::Predictor).unwrap(), 3);
        assert_eq!(decoder.get_tag_u32(Tag::Compression).unwrap(), 8);

        let back = SrtmTile::from_file(&path).unwrap();
        assert_eq!(back.shape(), data.shape());
        assert_eq!(back.get(599, 6).unwrap(), Some((599 * 7 + 6) as f32));
        assert_eq!(back.transform(), transform);
    }

    #[test]
    fn test_window_across_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.tif");
        let data = Array2::from_fn(RasterShape::new(300, 300), |r, c| (r * 1000 + c) as f32 - 5.5);
        write_geotiff(&path, &data, &Affine::north_up(0.0, 0.0, RES, -RES), -9999.0).unwrap();

        let tile = SrtmTile::from_file(&path).unwrap();
        let window = PixelWindow::new(250, 250, 10, 10);
        assert_eq!(tile.read_window(&window).unwrap(), data.window(&window));
    }

    #[test]
    fn test_rotated_transform_rejected() {
        let dir = TempDir::new().unwrap();
        let data = Array2::filled(RasterShape::new(1, 1), 0.0f32);
        let rotated = Affine::new(RES, 0.1, 0.0, 0.0, -RES, 0.0);
        assert!(write_geotiff(dir.path().join("x.tif"), &data, &rotated, f32::NAN).is_err());
    }
}
