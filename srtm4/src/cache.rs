//! On-disk tile cache shared by concurrent processes.
//!
//! Each tile `srtm_XX_YY` uses two lock files in the cache directory:
//!
//! - `srtm_XX_YY.download.lock` serialises downloads, so a tile is fetched
//!   at most once however many processes ask for it.
//! - `srtm_XX_YY.write.lock` is held while the raster is written, so that a
//!   reader which finds the file on disk waits until it is complete.
//!
//! The raster is extracted next to its final path and renamed into place, so
//! a `srtm_XX_YY.tif` on disk is always a complete file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use crate::download::ArchiveFetcher;
use crate::error::{Result, SrtmError};
use crate::filename::{parse_tile_name, TileId, TILE_EXTENSION};
use crate::lock::LockGuard;

/// Outcome of [`TileCache::ensure_tile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileStatus {
    /// The raster is on disk at this path.
    Complete(PathBuf),
    /// The server had no usable archive for this tile (e.g. open ocean).
    Unavailable,
}

impl TileStatus {
    /// Path of the raster, if available.
    pub fn path(&self) -> Option<&Path> {
        match self {
            TileStatus::Complete(path) => Some(path),
            TileStatus::Unavailable => None,
        }
    }
}

/// Directory of extracted SRTM tiles plus the fetcher used to fill it.
#[derive(Clone)]
pub struct TileCache {
    dir: PathBuf,
    fetcher: Arc<dyn ArchiveFetcher>,
}

impl TileCache {
    /// Create a cache in `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P, fetcher: Arc<dyn ArchiveFetcher>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, fetcher })
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a tile raster.
    pub fn tile_path(&self, id: TileId) -> PathBuf {
        self.dir.join(id.raster_filename())
    }

    /// Path of the lock serialising downloads of a tile.
    pub fn download_lock_path(&self, id: TileId) -> PathBuf {
        self.dir.join(format!("{}.download.lock", id.name()))
    }

    /// Path of the lock held while a tile raster is written.
    pub fn write_lock_path(&self, id: TileId) -> PathBuf {
        self.dir.join(format!("{}.write.lock", id.name()))
    }

    /// Whether the raster of a tile is on disk.
    pub fn contains(&self, id: TileId) -> bool {
        self.tile_path(id).is_file()
    }

    /// Make sure a tile is on disk, downloading it if needed.
    ///
    /// Safe to call from any number of threads and processes at once. The
    /// archive is downloaded at most once and callers only ever see a
    /// complete raster.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails after all retries or a lock
    /// file cannot be opened. An archive that downloads but cannot be read is
    /// reported as [`TileStatus::Unavailable`] instead.
    pub fn ensure_tile(&self, id: TileId) -> Result<TileStatus> {
        let tif = self.tile_path(id);

        if tif.exists() {
            // Wait for a writer that may still hold the write lock
            drop(LockGuard::acquire(self.write_lock_path(id))?);
            return Ok(TileStatus::Complete(tif));
        }

        let _download = LockGuard::acquire(self.download_lock_path(id))?;

        // Another process may have finished while we waited
        if tif.exists() {
            tracing::debug!(tile = %id, "Tile downloaded by another process");
            return Ok(TileStatus::Complete(tif));
        }

        let archive = self.dir.join(id.archive_filename());
        if let Err(e) = self.fetcher.fetch(id, &archive) {
            remove_quietly(&archive);
            return Err(e);
        }

        let status = {
            let _write = LockGuard::acquire(self.write_lock_path(id))?;
            let status = match extract_tile(&archive, id, &tif) {
                Ok(()) => TileStatus::Complete(tif),
                Err(e) => {
                    tracing::warn!(tile = %id, error = %e, "Tile not available");
                    TileStatus::Unavailable
                }
            };
            remove_quietly(&archive);
            status
        };

        Ok(status)
    }

    /// Tiles currently present in the cache directory, sorted.
    pub fn cached_tiles(&self) -> Result<Vec<TileId>> {
        let mut tiles = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_tif = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(TILE_EXTENSION));
            if !is_tif {
                continue;
            }
            if let Some(id) = path.to_str().and_then(|p| parse_tile_name(p).ok()) {
                tiles.push(id);
            }
        }

        tiles.sort();
        Ok(tiles)
    }
}

/// Extract `<tile>.tif` from `archive` to `dest`, going through a `.part` file.
fn extract_tile(archive: &Path, id: TileId, dest: &Path) -> Result<()> {
    let extraction = |reason: String| SrtmError::Extraction {
        filename: id.archive_filename(),
        reason,
    };

    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(|e| extraction(e.to_string()))?;
    let mut entry = zip
        .by_name(&id.raster_filename())
        .map_err(|e| extraction(format!("{}: {}", id.raster_filename(), e)))?;

    let part = dest.with_extension(format!("{}.part", TILE_EXTENSION));
    let written = File::create(&part).and_then(|mut out| {
        io::copy(&mut entry, &mut out)?;
        out.sync_all()
    });
    if let Err(e) = written {
        remove_quietly(&part);
        return Err(extraction(e.to_string()));
    }

    fs::rename(&part, dest)?;
    tracing::info!(tile = %id, path = %dest.display(), "Tile extracted");
    Ok(())
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
