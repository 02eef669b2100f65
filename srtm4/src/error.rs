//! Error types for the srtm4 library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while caching, cropping or converting SRTM data.
#[derive(Error, Debug)]
pub enum SrtmError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error decoding or encoding a GeoTIFF raster.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// HTTP transport error.
    #[cfg(feature = "download")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Tile id outside `lon_id ∈ [1,72]`, `lat_id ∈ [1,24]`, or an unparsable tile name.
    #[error("Invalid tile id: {name}")]
    InvalidTileId { name: String },

    /// An interval whose upper bound is not strictly above its lower bound.
    #[error("Invalid interval: ({low}, {high})")]
    InvalidInterval { low: f64, high: f64 },

    /// Pixel window rounding exceeded tolerance, or mosaics that cannot be combined.
    #[error("Grid misalignment: {reason}")]
    GridMisalignment { reason: String },

    /// Failed to download a tile archive.
    #[error("Download failed for {filename}: {reason}")]
    DownloadFailed { filename: String, reason: String },

    /// The downloaded archive is not usable.
    #[error("Extraction failed for {filename}: {reason}")]
    Extraction { filename: String, reason: String },

    /// A datum name that is not recognised.
    #[error("Unknown datum '{name}' (expected orthometric or ellipsoidal)")]
    UnknownDatum { name: String },

    /// The geoid grid is missing or the datum shift had no effect.
    #[error("Datum resource error: {reason}")]
    DatumResource { reason: String },

    /// No tile could be opened for the requested bounds.
    #[error("No DEM tile found on bounds ({lon_min}, {lat_min}, {lon_max}, {lat_max})")]
    NoCoverage {
        lon_min: f64,
        lat_min: f64,
        lon_max: f64,
        lat_max: f64,
    },

    /// Tile ids returned by the locator are not ascending west→east and north→south.
    #[error("Tile ids not ordered: {first} -> {second}")]
    TileOrder { first: String, second: String },

    /// The external tile locator or point-elevation program failed.
    #[error("External program {program} failed: {reason}")]
    External { program: PathBuf, reason: String },
}

/// Result type alias using [`SrtmError`].
pub type Result<T> = std::result::Result<T, SrtmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SrtmError::InvalidTileId {
            name: "srtm_73_01".to_string(),
        };
        assert!(err.to_string().contains("srtm_73_01"));

        let err = SrtmError::InvalidInterval {
            low: 3.0,
            high: 1.0,
        };
        assert!(err.to_string().contains("(3, 1)"));

        let err = SrtmError::NoCoverage {
            lon_min: 1.0,
            lat_min: 2.0,
            lon_max: 3.0,
            lat_max: 4.0,
        };
        assert!(err.to_string().contains("(1, 2, 3, 4)"));

        let err = SrtmError::External {
            program: PathBuf::from("/opt/bin/srtm4_which_tile"),
            reason: "exit status 1".to_string(),
        };
        assert!(err.to_string().contains("srtm4_which_tile"));
    }
}
