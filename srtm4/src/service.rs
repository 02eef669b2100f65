//! SRTM crop service.
//!
//! This module provides [`SrtmService`], which turns a geographic rectangle
//! into a pixel-aligned elevation mosaic: it finds the tiles covering the
//! rectangle, makes sure they are in the cache, merges them and optionally
//! converts heights to the WGS84 ellipsoid.
//!
//! ```ignore
//! use srtm4::{Bounds, Datum, SrtmServiceBuilder};
//!
//! let service = SrtmServiceBuilder::from_env()?.build()?;
//! if let Some(mosaic) = service.crop(&Bounds::new(2.2, 48.8, 2.5, 48.9), Datum::Orthometric)? {
//!     println!("{} x {}", mosaic.data.cols(), mosaic.data.rows());
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use rayon::prelude::*;

use crate::affine::Affine;
use crate::align::{AlignedGrid, GridSpec};
use crate::bounds::{intersect_interval, wrap_lon, Bounds};
use crate::cache::{TileCache, TileStatus};
use crate::download::ArchiveFetcher;
use crate::error::{Result, SrtmError};
use crate::filename::{parse_tile_name, TileId, MAX_LAT, MIN_LAT};
use crate::geoid::{to_ellipsoid, Datum, Egm96Grid, GeoidModel};
use crate::locator::{CommandLocator, GridLocator, TileLocator};
use crate::merge::merge;
use crate::points::{CommandElevation, PointElevation};
use crate::raster::{Array2, RasterSource};
use crate::tile::SrtmTile;

#[cfg(feature = "download")]
use crate::download::{DownloadConfig, HttpFetcher};

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// Default number of open tiles kept in memory.
const DEFAULT_MEMORY_TILES: u64 = 16;

/// A cropped elevation raster.
#[derive(Debug, Clone)]
pub struct Mosaic {
    /// Heights, row-major from the north-west corner.
    pub data: Array2<f32>,
    /// Pixel-is-area transform of `data`.
    pub transform: Affine,
    /// EPSG code of the coordinate reference system.
    pub crs_epsg: u32,
    /// Value of pixels without data.
    pub nodata: f32,
    /// Vertical datum of the heights.
    pub datum: Datum,
}

impl Mosaic {
    /// Geographic extent of the mosaic, pixel edges included.
    pub fn bounds(&self) -> Bounds {
        let shape = self.data.shape();
        let (w, n) = self.transform.apply(0.0, 0.0);
        let (e, s) = self.transform.apply(shape.cols as f64, shape.rows as f64);
        Bounds::new(w, s, e, n)
    }
}

/// Statistics about the in-memory tile cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently in memory.
    pub entry_count: u64,
    /// Number of requests served from memory.
    pub hit_count: u64,
    /// Number of tiles opened from disk.
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Per-tile result of preparing a crop.
enum TileOutcome {
    Complete(Arc<SrtmTile>),
    Unavailable,
    Failed(SrtmError),
}

/// SRTM crop service over a shared on-disk tile cache.
///
/// The service is `Sync`; a single instance can serve crops from many
/// threads, and several processes may share one cache directory.
pub struct SrtmService {
    cache: TileCache,
    locator: Box<dyn TileLocator>,
    geoid: Option<Arc<dyn GeoidModel>>,
    geoid_path: Option<PathBuf>,
    bin_dir: Option<PathBuf>,
    grid: GridSpec,
    nodata: f32,
    default_datum: Datum,
    /// Open tile headers, keyed by tile id.
    tiles: Cache<TileId, Arc<SrtmTile>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl SrtmService {
    /// Create a builder for a service caching tiles in `cache_dir`.
    pub fn builder<P: AsRef<Path>>(cache_dir: P) -> SrtmServiceBuilder {
        SrtmServiceBuilder::new(cache_dir)
    }

    /// Crop the mosaic covering `bounds`, handling the antimeridian.
    ///
    /// Longitudes may be given in any range; they are wrapped into
    /// `[-180, 180)`. When the wrapped east edge falls west of the wrapped west
    /// edge the rectangle crosses the antimeridian and is cropped as two
    /// halves placed side by side, west half first.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(mosaic))` - the merged heights
    /// - `Ok(None)` - the rectangle lies entirely outside SRTM latitudes
    ///
    /// # Errors
    ///
    /// Returns [`SrtmError::InvalidInterval`] if `lon_min > lon_max` or the
    /// rectangle spans 360° or more of longitude, [`SrtmError::NoCoverage`] if no tile could be opened, and any error
    /// of [`Self::crop_span`].
    pub fn crop(&self, bounds: &Bounds, datum: Datum) -> Result<Option<Mosaic>> {
        // Negated so that NaN is rejected too
        if !(bounds.lon_min <= bounds.lon_max) || bounds.width() >= 360.0 {
            return Err(SrtmError::InvalidInterval {
                low: bounds.lon_min,
                high: bounds.lon_max,
            });
        }

        let start = wrap_lon(bounds.lon_min);
        let end = wrap_lon(bounds.lon_max);

        if end >= start {
            return self.crop_span(
                &Bounds::new(start, bounds.lat_min, end, bounds.lat_max),
                datum,
            );
        }

        let res = self.grid.res();
        let offset = 0.1 * res;
        let west = Bounds::new(start, bounds.lat_min, 180.0 - res - offset, bounds.lat_max);
        let east = Bounds::new(-180.0 + offset, bounds.lat_min, end, bounds.lat_max);
        tracing::debug!(?west, ?east, "Splitting crop at the antimeridian");

        let west_crop = self.crop_span(&west, datum);
        let east_crop = self.crop_span(&east, datum);

        let (west_crop, east_crop) = match (west_crop, east_crop) {
            (Err(SrtmError::NoCoverage { .. }), Err(SrtmError::NoCoverage { .. })) => {
                return Err(SrtmError::NoCoverage {
                    lon_min: bounds.lon_min,
                    lat_min: bounds.lat_min,
                    lon_max: bounds.lon_max,
                    lat_max: bounds.lat_max,
                })
            }
            (w, e) => (
                self.or_blank(w, &west, datum)?,
                self.or_blank(e, &east, datum)?,
            ),
        };

        match (west_crop, east_crop) {
            (Some(w), Some(e)) => {
                if w.data.rows() != e.data.rows() {
                    return Err(SrtmError::GridMisalignment {
                        reason: format!(
                            "antimeridian halves have {} and {} rows",
                            w.data.rows(),
                            e.data.rows()
                        ),
                    });
                }
                let data = Array2::hstack(&[&w.data, &e.data])?;
                Ok(Some(Mosaic { data, ..w }))
            }
            (None, None) => Ok(None),
            // Both halves share the same latitude band
            _ => Err(SrtmError::GridMisalignment {
                reason: "only one antimeridian half intersects SRTM latitudes".to_string(),
            }),
        }
    }

    /// Crop a rectangle that does not cross the antimeridian.
    ///
    /// # Arguments
    ///
    /// * `bounds` - Rectangle with `lon_min <= lon_max`, both in `[-180, 180)`
    /// * `datum` - Vertical datum of the returned heights
    ///
    /// # Errors
    ///
    /// Returns an error if the locator fails or returns tiles out of order
    /// ([`SrtmError::TileOrder`]), if no tile could be opened
    /// ([`SrtmError::NoCoverage`]) or if the datum conversion fails. Tiles that
    /// fail to download or are unavailable are logged and left as nodata.
    pub fn crop_span(&self, bounds: &Bounds, datum: Datum) -> Result<Option<Mosaic>> {
        let Some((lat_min, lat_max)) = intersect_interval(bounds.lat_interval(), (MIN_LAT, MAX_LAT))?
        else {
            tracing::warn!(?bounds, "Bounds outside SRTM latitudes [-60, 60]");
            return Ok(None);
        };

        let grid = self.grid.align(&Bounds::new(bounds.lon_min, lat_min, bounds.lon_max, lat_max));
        let tile_ids = self.tiles_for(&grid)?;

        let outcomes: Vec<(TileId, TileOutcome)> = tile_ids
            .par_iter()
            .map(|&id| (id, self.prepare_tile(id)))
            .collect();

        let mut opened = Vec::new();
        let (mut unavailable, mut failed) = (0usize, 0usize);
        for (id, outcome) in outcomes {
            match outcome {
                TileOutcome::Complete(tile) => opened.push(tile),
                TileOutcome::Unavailable => unavailable += 1,
                TileOutcome::Failed(e) => {
                    tracing::warn!(tile = %id, error = %e, "Skipping tile");
                    failed += 1;
                }
            }
        }
        tracing::info!(
            tiles = tile_ids.len(),
            opened = opened.len(),
            unavailable,
            failed,
            "Prepared tiles"
        );

        if opened.is_empty() {
            return Err(SrtmError::NoCoverage {
                lon_min: grid.bounds.lon_min,
                lat_min: grid.bounds.lat_min,
                lon_max: grid.bounds.lon_max,
                lat_max: grid.bounds.lat_max,
            });
        }

        let sources: Vec<&dyn RasterSource> =
            opened.iter().map(|t| t.as_ref() as &dyn RasterSource).collect();
        let data = merge(&sources, &grid.transform, grid.shape, self.nodata)?;

        self.finish(data, &grid, datum).map(Some)
    }

    /// Make sure a tile is in the on-disk cache.
    pub fn ensure_tile(&self, id: TileId) -> Result<TileStatus> {
        self.cache.ensure_tile(id)
    }

    /// Heights at individual points through the external `srtm4` program.
    ///
    /// # Errors
    ///
    /// Returns [`SrtmError::External`] if no binary directory is configured
    /// or the program fails.
    pub fn point_elevations(&self, points: &[(f64, f64)]) -> Result<Vec<f64>> {
        let bin_dir = self.bin_dir.as_ref().ok_or_else(|| SrtmError::External {
            program: PathBuf::from(crate::points::ELEVATION_PROGRAM),
            reason: "no binary directory configured (SRTM4_BIN)".to_string(),
        })?;

        CommandElevation::in_dir(bin_dir, &self.cache, self.locator.as_ref())
            .with_geoid_path(self.geoid_path.as_deref())
            .elevations(points)
    }

    /// Tile names covering `points`, from the configured locator.
    pub fn locate(&self, points: &[(f64, f64)]) -> Result<Vec<String>> {
        self.locator.locate(points)
    }

    /// Get in-memory cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.tiles.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// The on-disk tile cache.
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    pub fn default_datum(&self) -> Datum {
        self.default_datum
    }

    /// Tiles spanned by an aligned grid, row by row from the north-west.
    fn tiles_for(&self, grid: &AlignedGrid) -> Result<Vec<TileId>> {
        let b = &grid.bounds;
        // An edge snapped up to 180° still belongs to the last tile column
        let east = b.lon_max.min(180.0 - 0.1 * self.grid.res());
        let names = self
            .locator
            .locate(&[(b.lon_min, b.lat_max), (east, b.lat_min)])?;

        let (first, last) = match names.as_slice() {
            [first, last] => (parse_tile_name(first)?, parse_tile_name(last)?),
            _ => {
                return Err(SrtmError::GridMisalignment {
                    reason: format!("locator returned {} names for 2 corners", names.len()),
                })
            }
        };

        if first.lon_id() > last.lon_id() || first.lat_id() > last.lat_id() {
            return Err(SrtmError::TileOrder {
                first: first.name(),
                second: last.name(),
            });
        }

        (first.lat_id()..=last.lat_id())
            .flat_map(|lat| (first.lon_id()..=last.lon_id()).map(move |lon| TileId::new(lon, lat)))
            .collect()
    }

    /// Ensure a tile is on disk and open it.
    fn prepare_tile(&self, id: TileId) -> TileOutcome {
        let path = match self.cache.ensure_tile(id) {
            Ok(TileStatus::Complete(path)) => path,
            Ok(TileStatus::Unavailable) => return TileOutcome::Unavailable,
            Err(e) => return TileOutcome::Failed(e),
        };

        match self.open_tile(id, &path) {
            Ok(tile) => TileOutcome::Complete(tile),
            Err(e) => TileOutcome::Failed(e),
        }
    }

    /// Load a tile header from memory or from disk.
    fn open_tile(&self, id: TileId, path: &Path) -> Result<Arc<SrtmTile>> {
        if let Some(tile) = self.tiles.get(&id) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(tile);
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let tile = Arc::new(SrtmTile::from_file_with_id(path, Some(id))?);
        self.tiles.insert(id, tile.clone());
        Ok(tile)
    }

    /// Apply the datum and wrap the merged heights.
    fn finish(&self, data: Array2<f32>, grid: &AlignedGrid, datum: Datum) -> Result<Mosaic> {
        let data = match datum {
            Datum::Orthometric => data,
            Datum::Ellipsoidal => {
                let geoid = self.geoid.as_deref().ok_or_else(|| SrtmError::DatumResource {
                    reason: "no geoid model configured (GEOID_PATH)".to_string(),
                })?;
                // Pixel centres
                let centre = |r: usize, c: usize| grid.transform.apply(c as f64 + 0.5, r as f64 + 0.5);
                let lons = Array2::from_fn(grid.shape, |r, c| centre(r, c).0);
                let lats = Array2::from_fn(grid.shape, |r, c| centre(r, c).1);
                to_ellipsoid(&lons, &lats, &data, self.nodata, geoid)?
            }
        };

        Ok(Mosaic {
            data,
            transform: grid.transform,
            crs_epsg: EPSG_WGS84,
            nodata: self.nodata,
            datum,
        })
    }

    /// Replace a half without coverage by a nodata block of its aligned shape.
    fn or_blank(
        &self,
        crop: Result<Option<Mosaic>>,
        bounds: &Bounds,
        datum: Datum,
    ) -> Result<Option<Mosaic>> {
        match crop {
            Err(SrtmError::NoCoverage { .. }) => {
                let Some((lat_min, lat_max)) =
                    intersect_interval(bounds.lat_interval(), (MIN_LAT, MAX_LAT))?
                else {
                    return Ok(None);
                };
                tracing::warn!(?bounds, "No tile coverage, filling with nodata");
                let grid = self.grid.align(&Bounds::new(bounds.lon_min, lat_min, bounds.lon_max, lat_max));
                Ok(Some(Mosaic {
                    data: Array2::filled(grid.shape, self.nodata),
                    transform: grid.transform,
                    crs_epsg: EPSG_WGS84,
                    nodata: self.nodata,
                    datum,
                }))
            }
            other => other,
        }
    }
}

/// Builder for configuring an [`SrtmService`].
///
/// # Example
///
/// ```ignore
/// use srtm4::{Datum, SrtmServiceBuilder};
///
/// let service = SrtmServiceBuilder::new("/data/srtm")
///     .memory_tiles(4)
///     .geoid_path("/usr/share/GeographicLib/geoids")
///     .default_datum(Datum::Ellipsoidal)
///     .build()?;
/// ```
pub struct SrtmServiceBuilder {
    cache_dir: PathBuf,
    memory_tiles: u64,
    grid: GridSpec,
    nodata: f32,
    default_datum: Datum,
    geoid_path: Option<PathBuf>,
    geoid: Option<Arc<dyn GeoidModel>>,
    bin_dir: Option<PathBuf>,
    locator: Option<Box<dyn TileLocator>>,
    fetcher: Option<Arc<dyn ArchiveFetcher>>,
    #[cfg(feature = "download")]
    download_config: DownloadConfig,
}

impl SrtmServiceBuilder {
    /// Create a new builder with the specified cache directory.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            memory_tiles: DEFAULT_MEMORY_TILES,
            grid: GridSpec::default(),
            nodata: f32::NAN,
            default_datum: Datum::default(),
            geoid_path: None,
            geoid: None,
            bin_dir: None,
            locator: None,
            fetcher: None,
            #[cfg(feature = "download")]
            download_config: DownloadConfig::default(),
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SRTM4_CACHE` | Tile cache directory | `~/.srtm` |
    /// | `SRTM4_URL` | Base URL of the tile archives* | CGIAR-CSI |
    /// | `GEOID_PATH` | EGM96 grid file or directory | None |
    /// | `SRTM4_BIN` | Directory with `srtm4_which_tile` and `srtm4` | None |
    /// | `SRTM4_MEM_TILES` | Open tiles kept in memory | 16 |
    ///
    /// *Only used when `download` feature is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if `SRTM4_CACHE` is not set and the home directory
    /// cannot be determined.
    pub fn from_env() -> Result<Self> {
        let cache_dir = match std::env::var_os("SRTM4_CACHE") {
            Some(dir) => PathBuf::from(dir),
            None => default_cache_dir()?,
        };

        let mut builder = Self::new(cache_dir);

        if let Some(tiles) = std::env::var("SRTM4_MEM_TILES")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            builder.memory_tiles = tiles;
        }
        builder.geoid_path = std::env::var_os("GEOID_PATH").map(PathBuf::from);
        builder.bin_dir = std::env::var_os("SRTM4_BIN").map(PathBuf::from);

        #[cfg(feature = "download")]
        if let Ok(url) = std::env::var("SRTM4_URL") {
            builder.download_config.base_url = url;
        }

        Ok(builder)
    }

    /// Set the cache directory.
    ///
    /// Overrides the directory set in the constructor or from environment.
    pub fn cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the maximum number of open tiles to keep in memory.
    ///
    /// Only tile headers are kept; samples are read per window. Default is 16 tiles.
    pub fn memory_tiles(mut self, tiles: u64) -> Self {
        self.memory_tiles = tiles;
        self
    }

    /// Set the output pixel grid.
    pub fn grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    /// Set the value of pixels without data. Default is NaN.
    pub fn nodata(mut self, nodata: f32) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn default_datum(mut self, datum: Datum) -> Self {
        self.default_datum = datum;
        self
    }

    /// Load the EGM96 grid from a `.pgm` file or a directory containing `egm96-15.pgm`.
    pub fn geoid_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.geoid_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use a custom geoid model instead of the EGM96 grid.
    pub fn geoid(mut self, geoid: impl GeoidModel + 'static) -> Self {
        self.geoid = Some(Arc::new(geoid));
        self
    }

    /// Use `srtm4_which_tile` and `srtm4` from a directory of binaries.
    pub fn bin_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.bin_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Use a custom tile locator.
    pub fn locator(mut self, locator: impl TileLocator + 'static) -> Self {
        self.locator = Some(Box::new(locator));
        self
    }

    /// Use a custom archive transport instead of HTTP.
    pub fn fetcher(mut self, fetcher: impl ArchiveFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Configure HTTP downloads.
    #[cfg(feature = "download")]
    pub fn download_config(mut self, config: DownloadConfig) -> Self {
        self.download_config = config;
        self
    }

    /// Build the [`SrtmService`].
    ///
    /// A geoid grid that cannot be loaded is logged and only reported when an
    /// ellipsoidal crop is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the HTTP
    /// client cannot be initialized.
    pub fn build(self) -> Result<SrtmService> {
        let fetcher: Arc<dyn ArchiveFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            #[cfg(feature = "download")]
            None => Arc::new(HttpFetcher::new(self.download_config)?),
            #[cfg(not(feature = "download"))]
            None => {
                return Err(SrtmError::DownloadFailed {
                    filename: String::new(),
                    reason: "built without the `download` feature and no fetcher configured"
                        .to_string(),
                })
            }
        };
        let cache = TileCache::new(&self.cache_dir, fetcher)?;

        let locator: Box<dyn TileLocator> = match (self.locator, &self.bin_dir) {
            (Some(locator), _) => locator,
            (None, Some(bin)) => {
                Box::new(CommandLocator::in_dir(bin).with_cache_dir(&self.cache_dir))
            }
            (None, None) => Box::new(GridLocator),
        };

        let geoid: Option<Arc<dyn GeoidModel>> = match (self.geoid, &self.geoid_path) {
            (Some(geoid), _) => Some(geoid),
            (None, Some(path)) => match Egm96Grid::open(path) {
                Ok(grid) => Some(Arc::new(grid)),
                Err(e) => {
                    tracing::warn!(error = %e, "Geoid grid not loaded");
                    None
                }
            },
            (None, None) => None,
        };

        tracing::debug!(
            cache_dir = %self.cache_dir.display(),
            memory_tiles = self.memory_tiles,
            "Built SRTM service"
        );

        Ok(SrtmService {
            cache,
            locator,
            geoid,
            geoid_path: self.geoid_path,
            bin_dir: self.bin_dir,
            grid: self.grid,
            nodata: self.nodata,
            default_datum: self.default_datum,
            tiles: Cache::builder().max_capacity(self.memory_tiles).build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }
}

/// `~/.srtm`.
pub fn default_cache_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".srtm"))
        .ok_or_else(|| {
            SrtmError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "cannot determine home directory, set SRTM4_CACHE",
            ))
        })
}
