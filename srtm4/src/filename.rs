//! SRTM 5°×5° tile ids and filename utilities.
//!
//! CGIAR distributes SRTM 90m in 5°×5° tiles on an equirectangular grid
//! covering latitudes −60° to +60°.
//!
//! # Filename Format
//!
//! Tiles follow the naming convention `srtm_{lon_id:02}_{lat_id:02}`:
//!
//! - `lon_id`: 1 to 72, west to east starting at −180°
//! - `lat_id`: 1 to 24, north to south starting at +60°
//!
//! The tile `srtm_37_04` covers longitudes 0° to 5° and latitudes 45° to 40°.

use std::fmt;

use crate::error::{Result, SrtmError};

/// Tile edge length in degrees.
pub const TILE_DEGREES: f64 = 5.0;

/// Number of tile columns (longitude ids).
pub const LON_IDS: u8 = 72;

/// Number of tile rows (latitude ids).
pub const LAT_IDS: u8 = 24;

/// Northern edge of SRTM coverage.
pub const MAX_LAT: f64 = 60.0;

/// Southern edge of SRTM coverage.
pub const MIN_LAT: f64 = -60.0;

/// Extension of extracted tile rasters.
pub const TILE_EXTENSION: &str = "tif";

/// Extension of downloaded tile archives.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Identifier of a 5°×5° SRTM tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    lon_id: u8,
    lat_id: u8,
}

impl TileId {
    /// Create a tile id, validating both components.
    pub fn new(lon_id: u8, lat_id: u8) -> Result<Self> {
        if !(1..=LON_IDS).contains(&lon_id) || !(1..=LAT_IDS).contains(&lat_id) {
            return Err(SrtmError::InvalidTileId {
                name: format!("srtm_{:02}_{:02}", lon_id, lat_id),
            });
        }
        Ok(Self { lon_id, lat_id })
    }

    /// The tile covering a coordinate.
    ///
    /// Longitudes are wrapped into `[-180, 180)`. Latitudes outside SRTM coverage
    /// are clamped to the first or last row of tiles.
    ///
    /// ```
    /// use srtm4::filename::TileId;
    ///
    /// assert_eq!(TileId::containing(2.35, 48.85).name(), "srtm_37_03");
    /// assert_eq!(TileId::containing(-180.0, 60.0).name(), "srtm_01_01");
    /// ```
    pub fn containing(lon: f64, lat: f64) -> Self {
        let lon = crate::bounds::wrap_lon(lon);
        let col = ((lon + 180.0) / TILE_DEGREES).floor() as i64 + 1;
        let row = ((MAX_LAT - lat) / TILE_DEGREES).floor() as i64 + 1;

        Self {
            lon_id: col.clamp(1, LON_IDS as i64) as u8,
            lat_id: row.clamp(1, LAT_IDS as i64) as u8,
        }
    }

    /// Longitude id, 1 to 72.
    pub fn lon_id(&self) -> u8 {
        self.lon_id
    }

    /// Latitude id, 1 to 24.
    pub fn lat_id(&self) -> u8 {
        self.lat_id
    }

    /// Western edge of the tile in degrees.
    pub fn west(&self) -> f64 {
        -180.0 + TILE_DEGREES * (self.lon_id - 1) as f64
    }

    /// Northern edge of the tile in degrees.
    pub fn north(&self) -> f64 {
        MAX_LAT - TILE_DEGREES * (self.lat_id - 1) as f64
    }

    /// Canonical tile name, e.g. `srtm_07_03`.
    pub fn name(&self) -> String {
        tile_name(*self)
    }

    /// File name of the extracted raster, e.g. `srtm_07_03.tif`.
    pub fn raster_filename(&self) -> String {
        format!("{}.{}", self.name(), TILE_EXTENSION)
    }

    /// File name of the downloadable archive, e.g. `srtm_07_03.zip`.
    pub fn archive_filename(&self) -> String {
        format!("{}.{}", self.name(), ARCHIVE_EXTENSION)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "srtm_{:02}_{:02}", self.lon_id, self.lat_id)
    }
}

/// Convert a tile id to its canonical name.
pub fn tile_name(id: TileId) -> String {
    id.to_string()
}

/// Parse a tile name into a [`TileId`].
///
/// Accepts a bare name, a name with `.tif` or `.zip` extension, or a path.
///
/// # Examples
///
/// ```
/// use srtm4::filename::{parse_tile_name, TileId};
///
/// assert_eq!(parse_tile_name("srtm_07_03").unwrap(), TileId::new(7, 3).unwrap());
/// assert_eq!(parse_tile_name("/cache/srtm_72_24.tif").unwrap(), TileId::new(72, 24).unwrap());
/// assert!(parse_tile_name("srtm_73_01").is_err());
/// ```
pub fn parse_tile_name(name: &str) -> Result<TileId> {
    let invalid = || SrtmError::InvalidTileId {
        name: name.to_string(),
    };

    // Extract just the filename if a path is given
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let base = base
        .strip_suffix(".tif")
        .or_else(|| base.strip_suffix(".zip"))
        .unwrap_or(base);

    let mut parts = base.split('_');
    if parts.next() != Some("srtm") {
        return Err(invalid());
    }
    let lon_id: u8 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
    let lat_id: u8 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    TileId::new(lon_id, lat_id).map_err(|_| invalid())
}
