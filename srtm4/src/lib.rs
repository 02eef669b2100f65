//! # srtm4 - SRTM 5°×5° tile cache and DEM cropping
//!
//! Crops pixel-aligned elevation rasters out of the CGIAR-CSI SRTM 90m v4.1
//! dataset, downloading the 5°×5° tiles it needs into a local cache that any
//! number of processes can share.
//!
//! ## Features
//!
//! - **Shared cache**: per-tile file locks make concurrent downloads safe; a
//!   tile is fetched once and readers never see a half-written file
//! - **Grid alignment**: every crop lies on the 3 arc-second SRTM grid
//! - **Antimeridian**: rectangles crossing ±180° are cropped in two halves
//!   and joined
//! - **Datum conversion**: optional EGM96 to WGS84 ellipsoid heights
//!
//! ## Quick Start
//!
//! ```ignore
//! use srtm4::{write_mosaic, Bounds, Datum, SrtmServiceBuilder};
//!
//! let service = SrtmServiceBuilder::new("/data/srtm").build()?;
//!
//! // Mont Blanc massif
//! let bounds = Bounds::new(6.75, 45.75, 7.0, 45.95);
//! if let Some(mosaic) = service.crop(&bounds, Datum::Orthometric)? {
//!     write_mosaic("mont_blanc.tif", &mosaic)?;
//! }
//! ```
//!
//! ## Tile grid
//!
//! Tiles are named `srtm_XX_YY` where `XX` (1 to 72) counts 5° columns
//! eastward from 180°W and `YY` (1 to 24) counts 5° rows southward from
//! 60°N. Each tile is a 6000×6000 GeoTIFF of 16-bit heights in metres above
//! the EGM96 geoid, with -32768 marking voids.

pub mod affine;
pub mod align;
pub mod bounds;
pub mod cache;
pub mod download;
pub mod error;
pub mod filename;
pub mod geoid;
pub mod locator;
pub mod lock;
pub mod merge;
pub mod output;
pub mod points;
pub mod raster;
pub mod service;
pub mod tile;
pub mod window;

// Re-export main types at crate root for convenience
pub use affine::Affine;
pub use align::{align_to_grid, AlignedGrid, GridSpec, RasterShape, RES};
pub use bounds::{intersect_interval, wrap_lon, Bounds};
pub use cache::{TileCache, TileStatus};
pub use download::{ArchiveFetcher, DownloadConfig};
pub use error::{Result, SrtmError};
pub use filename::{parse_tile_name, tile_name, TileId};
pub use geoid::{to_ellipsoid, Datum, Egm96Grid, GeoidModel};
pub use locator::{CommandLocator, GridLocator, TileLocator};
pub use merge::merge;
pub use output::{write_geotiff, write_mosaic};
pub use points::{CommandElevation, PointElevation};
pub use raster::{Array2, MemRaster, RasterSource, Sample};
pub use service::{CacheStats, Mosaic, SrtmService, SrtmServiceBuilder, EPSG_WGS84};
pub use tile::{SrtmTile, VOID_VALUE};
pub use window::{intersect_bounds, pixel_window, PixelWindow};

#[cfg(feature = "download")]
pub use download::HttpFetcher;
