//! Mapping points to tile names.
//!
//! [`GridLocator`] computes tile names from the 5° grid directly.
//! [`CommandLocator`] delegates to the external `srtm4_which_tile` program,
//! which reads `lon lat` lines on stdin and prints one tile name per point.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Result, SrtmError};
use crate::filename::TileId;

/// Name of the external tile locator program.
pub const WHICH_TILE_PROGRAM: &str = "srtm4_which_tile";

/// Finds the tile containing each point.
pub trait TileLocator: Send + Sync {
    /// Tile names for `(lon, lat)` points, in input order.
    fn locate(&self, points: &[(f64, f64)]) -> Result<Vec<String>>;
}

/// Computes tile names from the CGIAR 5° grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridLocator;

impl TileLocator for GridLocator {
    fn locate(&self, points: &[(f64, f64)]) -> Result<Vec<String>> {
        Ok(points
            .iter()
            .map(|&(lon, lat)| TileId::containing(lon, lat).name())
            .collect())
    }
}

/// Runs `srtm4_which_tile` to locate points.
#[derive(Debug, Clone)]
pub struct CommandLocator {
    program: PathBuf,
    cache_dir: Option<PathBuf>,
}

impl CommandLocator {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            cache_dir: None,
        }
    }

    /// Use `srtm4_which_tile` from a directory of binaries.
    pub fn in_dir<P: AsRef<Path>>(bin_dir: P) -> Self {
        Self::new(bin_dir.as_ref().join(WHICH_TILE_PROGRAM))
    }

    /// Pass the cache directory to the program as `SRTM4_CACHE`.
    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl TileLocator for CommandLocator {
    fn locate(&self, points: &[(f64, f64)]) -> Result<Vec<String>> {
        let envs: Vec<(&str, OsString)> = self
            .cache_dir
            .iter()
            .map(|dir| ("SRTM4_CACHE", dir.clone().into_os_string()))
            .collect();

        let stdout = run_with_points(&self.program, &envs, points)?;
        let names: Vec<String> = stdout.split_whitespace().map(str::to_string).collect();

        if names.len() != points.len() {
            return Err(SrtmError::External {
                program: self.program.clone(),
                reason: format!("expected {} tile names, got {}", points.len(), names.len()),
            });
        }
        Ok(names)
    }
}

/// Run `program` with one `lon lat` line per point on stdin and return its stdout.
pub(crate) fn run_with_points(
    program: &Path,
    envs: &[(&str, OsString)],
    points: &[(f64, f64)],
) -> Result<String> {
    let external = |reason: String| SrtmError::External {
        program: program.to_path_buf(),
        reason,
    };

    let input: String = points
        .iter()
        .map(|(lon, lat)| format!("{} {}\n", lon, lat))
        .collect();

    let mut child = Command::new(program)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| external(e.to_string()))?;

    // stdin is fed from its own thread while stdout drains
    let stdin = child.stdin.take();
    let (written, output) = std::thread::scope(|s| {
        let writer = s.spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(input.as_bytes()),
            None => Ok(()),
        });
        let output = child.wait_with_output();
        (writer.join(), output)
    });

    let output = output.map_err(|e| external(e.to_string()))?;
    if !output.status.success() {
        return Err(external(format!(
            "{}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    written
        .map_err(|_| external("stdin writer panicked".to_string()))?
        .map_err(|e| external(e.to_string()))?;

    String::from_utf8(output.stdout).map_err(|e| external(e.to_string()))
}
