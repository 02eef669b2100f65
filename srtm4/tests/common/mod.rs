//! Shared fixtures: synthetic tiles served by an in-process fetcher.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use srtm4::{write_geotiff, Affine, ArchiveFetcher, Array2, RasterShape, Result, TileId, RES};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A small raster standing in for a full 6000 × 6000 tile.
#[derive(Clone)]
pub struct Patch {
    pub data: Array2<f32>,
    pub transform: Affine,
}

impl Patch {
    /// `rows × cols` samples with the first sample centred at `(lon, lat)`.
    pub fn new(lon: f64, lat: f64, rows: usize, cols: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        Self {
            data: Array2::from_fn(RasterShape::new(rows, cols), f),
            transform: Affine::north_up(lon, lat, RES, -RES),
        }
    }

    pub fn constant(lon: f64, lat: f64, rows: usize, cols: usize, value: f32) -> Self {
        Self::new(lon, lat, rows, cols, move |_, _| value)
    }
}

/// Serves zipped GeoTIFF patches; tiles without a patch get an HTML error page.
#[derive(Default)]
pub struct FixtureFetcher {
    patches: HashMap<TileId, Patch>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetched: Mutex<Vec<TileId>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tile(mut self, name: &str, patch: Patch) -> Self {
        let id = srtm4::parse_tile_name(name).unwrap();
        self.patches.insert(id, patch);
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Largest number of fetches observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<TileId> {
        self.fetched.lock().unwrap().clone()
    }
}

impl ArchiveFetcher for FixtureFetcher {
    fn fetch(&self, tile: TileId, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(tile);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let result = match self.patches.get(&tile) {
            Some(patch) => write_archive(tile, patch, dest),
            None => fs::write(dest, b"<html>404</html>").map_err(Into::into),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Zip a patch as `<tile>.tif`.
pub fn write_archive(tile: TileId, patch: &Patch, dest: &Path) -> Result<()> {
    let raster = dest.with_extension("fixture.tif");
    write_geotiff(&raster, &patch.data, &patch.transform, -32768.0)?;
    let bytes = fs::read(&raster)?;
    fs::remove_file(&raster)?;

    let mut zip = ZipWriter::new(File::create(dest)?);
    zip.start_file(tile.raster_filename(), SimpleFileOptions::default())
        .unwrap();
    zip.write_all(&bytes)?;
    zip.finish().unwrap();
    Ok(())
}
