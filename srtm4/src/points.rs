//! Elevations at individual points through the external `srtm4` program.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::cache::TileCache;
use crate::error::{Result, SrtmError};
use crate::filename::parse_tile_name;
use crate::locator::{run_with_points, TileLocator};

/// Name of the external point elevation program.
pub const ELEVATION_PROGRAM: &str = "srtm4";

/// Heights at a list of points.
pub trait PointElevation {
    /// Heights for `(lon, lat)` points, in input order.
    fn elevations(&self, points: &[(f64, f64)]) -> Result<Vec<f64>>;
}

/// Queries the `srtm4` program after making sure the tiles it reads are cached.
pub struct CommandElevation<'a> {
    program: PathBuf,
    cache: &'a TileCache,
    locator: &'a dyn TileLocator,
    geoid_path: Option<&'a Path>,
}

impl<'a> CommandElevation<'a> {
    pub fn new<P: Into<PathBuf>>(
        program: P,
        cache: &'a TileCache,
        locator: &'a dyn TileLocator,
    ) -> Self {
        Self {
            program: program.into(),
            cache,
            locator,
            geoid_path: None,
        }
    }

    /// Use `srtm4` from a directory of binaries.
    pub fn in_dir<P: AsRef<Path>>(
        bin_dir: P,
        cache: &'a TileCache,
        locator: &'a dyn TileLocator,
    ) -> Self {
        Self::new(bin_dir.as_ref().join(ELEVATION_PROGRAM), cache, locator)
    }

    /// Pass the geoid grid location to the program as `GEOID_PATH`.
    pub fn with_geoid_path(mut self, path: Option<&'a Path>) -> Self {
        self.geoid_path = path;
        self
    }
}

impl PointElevation for CommandElevation<'_> {
    fn elevations(&self, points: &[(f64, f64)]) -> Result<Vec<f64>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let tiles: BTreeSet<_> = self
            .locator
            .locate(points)?
            .iter()
            .map(|name| parse_tile_name(name))
            .collect::<Result<_>>()?;

        for &tile in &tiles {
            // Missing tiles read as nodata on the program's side
            self.cache.ensure_tile(tile)?;
        }

        let mut envs: Vec<(&str, OsString)> =
            vec![("SRTM4_CACHE", self.cache.dir().as_os_str().to_os_string())];
        if let Some(geoid) = self.geoid_path {
            envs.push(("GEOID_PATH", geoid.as_os_str().to_os_string()));
        }

        let stdout = run_with_points(&self.program, &envs, points)?;
        let heights = stdout
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>().map_err(|_| SrtmError::External {
                    program: self.program.clone(),
                    reason: format!("unexpected output '{}'", v),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if heights.len() != points.len() {
            return Err(SrtmError::External {
                program: self.program.clone(),
                reason: format!("expected {} heights, got {}", points.len(), heights.len()),
            });
        }

        tracing::debug!(points = points.len(), tiles = tiles.len(), "Queried point elevations");
        Ok(heights)
    }
}
