//! Vertical datum conversion.
//!
//! SRTM heights are orthometric, i.e. relative to the EGM96 geoid. Adding the
//! geoid undulation `N` at each sample gives heights above the WGS84
//! ellipsoid.
//!
//! Undulations are read from the GeographicLib EGM96 grid at 15 arc-minutes
//! (`egm96-15.pgm`), a 16-bit PGM image with the scaling stored in its header
//! comments.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, SrtmError};
use crate::raster::{Array2, Sample};

/// Vertical reference of output heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Datum {
    /// Heights above the EGM96 geoid, as stored in SRTM.
    #[default]
    Orthometric,
    /// Heights above the WGS84 ellipsoid.
    Ellipsoidal,
}

impl FromStr for Datum {
    type Err = SrtmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "orthometric" | "geoid" | "egm96" => Ok(Datum::Orthometric),
            "ellipsoidal" | "ellipsoid" | "wgs84" => Ok(Datum::Ellipsoidal),
            _ => Err(SrtmError::UnknownDatum {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Orthometric => write!(f, "orthometric"),
            Datum::Ellipsoidal => write!(f, "ellipsoidal"),
        }
    }
}

/// Geoid height above the WGS84 ellipsoid.
pub trait GeoidModel: Send + Sync {
    /// Undulation `N` in metres at a point.
    fn undulation(&self, lat: f64, lon: f64) -> f64;
}

/// EGM96 undulation grid in GeographicLib PGM format.
///
/// Rows run from 90°N southward and columns from 0° eastward, both with the
/// same spacing. Values are bilinearly interpolated, wrapping in longitude.
#[derive(Debug, Clone)]
pub struct Egm96Grid {
    raw: Vec<u16>,
    width: usize,
    height: usize,
    offset: f64,
    scale: f64,
}

impl Egm96Grid {
    /// File name of the 15 arc-minute grid.
    pub const FILENAME: &'static str = "egm96-15.pgm";

    /// Load the grid from a PGM file, or from [`Self::FILENAME`] inside a directory.
    ///
    /// # Errors
    ///
    /// Returns [`SrtmError::DatumResource`] if the file is missing or malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut path: PathBuf = path.as_ref().to_path_buf();
        if path.is_dir() {
            path.push(Self::FILENAME);
        }

        let bytes = fs::read(&path).map_err(|e| SrtmError::DatumResource {
            reason: format!("cannot read geoid grid {}: {}", path.display(), e),
        })?;

        let grid = Self::from_pgm(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            width = grid.width,
            height = grid.height,
            "Loaded geoid grid"
        );
        Ok(grid)
    }

    /// Parse a binary (`P5`) PGM with 16-bit samples.
    pub fn from_pgm(bytes: &[u8]) -> Result<Self> {
        let mut header = PgmHeader::new(bytes);

        if header.token()? != "P5" {
            return Err(malformed("not a binary PGM file"));
        }
        let width = header.number()?;
        let height = header.number()?;
        let maxval = header.number()?;
        if maxval <= 255 || maxval > 65535 {
            return Err(malformed("samples are not 16-bit"));
        }
        if width < 2 || height < 2 {
            return Err(malformed("grid is too small"));
        }

        // Exactly one whitespace byte separates the header from the samples
        let start = header.pos + 1;
        let len = width * height * 2;
        let data = bytes
            .get(start..start + len)
            .ok_or_else(|| malformed("truncated sample data"))?;
        let raw = data
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect();

        let offset = header.offset.ok_or_else(|| malformed("missing Offset comment"))?;
        let scale = header.scale.ok_or_else(|| malformed("missing Scale comment"))?;

        Ok(Self {
            raw,
            width,
            height,
            offset,
            scale,
        })
    }

    fn value(&self, row: usize, col: usize) -> f64 {
        self.offset + self.scale * self.raw[row * self.width + col] as f64
    }
}

impl GeoidModel for Egm96Grid {
    fn undulation(&self, lat: f64, lon: f64) -> f64 {
        let step = 360.0 / self.width as f64;

        let fx = lon.rem_euclid(360.0) / step;
        let fy = ((90.0 - lat) / step).clamp(0.0, (self.height - 1) as f64);

        let x0 = (fx.floor() as usize) % self.width;
        let x1 = (x0 + 1) % self.width;
        let y0 = (fy.floor() as usize).min(self.height - 2);
        let y1 = y0 + 1;
        let dx = fx - fx.floor();
        let dy = fy - y0 as f64;

        let top = self.value(y0, x0) * (1.0 - dx) + self.value(y0, x1) * dx;
        let bottom = self.value(y1, x0) * (1.0 - dx) + self.value(y1, x1) * dx;
        top * (1.0 - dy) + bottom * dy
    }
}

/// Cursor over the ASCII header of a PGM file.
struct PgmHeader<'a> {
    bytes: &'a [u8],
    pos: usize,
    offset: Option<f64>,
    scale: Option<f64>,
}

impl<'a> PgmHeader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            offset: None,
            scale: None,
        }
    }

    /// Next whitespace-delimited token, consuming comment lines on the way.
    fn token(&mut self) -> Result<&'a str> {
        loop {
            match self.bytes.get(self.pos) {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'#') => self.comment(),
                Some(_) => break,
                None => return Err(malformed("truncated header")),
            }
        }

        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| !b.is_ascii_whitespace())
        {
            self.pos += 1;
        }

        std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| malformed("non-ASCII header"))
    }

    fn number(&mut self) -> Result<usize> {
        let token = self.token()?;
        token
            .parse()
            .map_err(|_| malformed(&format!("bad header value '{}'", token)))
    }

    /// Consume a `#` comment line, picking up `# Offset` and `# Scale`.
    fn comment(&mut self) {
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|&b| b != b'\n') {
            self.pos += 1;
        }
        let line = String::from_utf8_lossy(&self.bytes[start..self.pos]);
        let mut words = line.trim_start_matches('#').split_whitespace();
        match (words.next(), words.next().and_then(|v| v.parse::<f64>().ok())) {
            (Some("Offset"), Some(v)) => self.offset = Some(v),
            (Some("Scale"), Some(v)) => self.scale = Some(v),
            _ => {}
        }
    }
}

fn malformed(reason: &str) -> SrtmError {
    SrtmError::DatumResource {
        reason: format!("malformed geoid grid: {}", reason),
    }
}

/// Round to 5 decimals.
fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

/// Convert orthometric heights to heights above the WGS84 ellipsoid.
///
/// `lons` and `lats` hold the coordinates of each sample of `heights`.
/// Samples equal to `nodata`, and NaN samples, are copied unchanged; other
/// results are rounded to 5 decimals.
///
/// # Errors
///
/// Returns [`SrtmError::GridMisalignment`] if the shapes differ and
/// [`SrtmError::DatumResource`] if no valid sample changed, which means the
/// geoid model did not apply.
pub fn to_ellipsoid(
    lons: &Array2<f64>,
    lats: &Array2<f64>,
    heights: &Array2<f32>,
    nodata: f32,
    geoid: &dyn GeoidModel,
) -> Result<Array2<f32>> {
    let shape = heights.shape();
    if lons.shape() != shape || lats.shape() != shape {
        return Err(SrtmError::GridMisalignment {
            reason: format!(
                "coordinate arrays {:?}/{:?} do not match heights {:?}",
                lons.shape(),
                lats.shape(),
                shape
            ),
        });
    }

    let mut valid = 0usize;
    let mut changed = 0usize;

    let converted: Vec<f32> = heights
        .as_slice()
        .iter()
        .zip(lons.as_slice().iter().zip(lats.as_slice()))
        .map(|(&h, (&lon, &lat))| {
            if h.is_nan() || h.is_nodata(nodata) {
                return h;
            }
            valid += 1;
            let out = round5(h as f64 + geoid.undulation(lat, lon)) as f32;
            if out != h {
                changed += 1;
            }
            out
        })
        .collect();

    if valid > 0 && changed == 0 {
        return Err(SrtmError::DatumResource {
            reason: "geoid shift left every height unchanged".to_string(),
        });
    }

    Array2::from_vec(shape, converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::RasterShape;
    use tempfile::TempDir;

    struct Constant(f64);

    impl GeoidModel for Constant {
        fn undulation(&self, _lat: f64, _lon: f64) -> f64 {
            self.0
        }
    }

    /// 4 × 3 grid (90° spacing) whose raw value is `row * 10 + col`.
    fn small_pgm() -> Vec<u8> {
        let mut bytes = b"P5\n# Offset -100\n# Scale 0.5\n4 3\n65535\n".to_vec();
        for row in 0..3u16 {
            for col in 0..4u16 {
                bytes.extend_from_slice(&(row * 10 + col).to_be_bytes());
            }
        }
        bytes
    }

    fn coords(shape: RasterShape) -> (Array2<f64>, Array2<f64>) {
        (
            Array2::from_fn(shape, |_, c| c as f64),
            Array2::from_fn(shape, |r, _| r as f64),
        )
    }

    #[test]
    fn test_datum_from_str() {
        assert_eq!("ellipsoidal".parse::<Datum>().unwrap(), Datum::Ellipsoidal);
        assert_eq!("Orthometric".parse::<Datum>().unwrap(), Datum::Orthometric);
        let err = "nad88".parse::<Datum>().unwrap_err();
        assert!(matches!(err, SrtmError::UnknownDatum { ref name } if name == "nad88"));
        assert_eq!(Datum::default(), Datum::Orthometric);
        assert_eq!(Datum::Ellipsoidal.to_string(), "ellipsoidal");
    }

    #[test]
    fn test_parse_pgm() {
        let grid = Egm96Grid::from_pgm(&small_pgm()).unwrap();
        // Grid nodes
        assert_eq!(grid.undulation(90.0, 0.0), -100.0);
        assert_eq!(grid.undulation(0.0, 90.0), -100.0 + 0.5 * 11.0);
        assert_eq!(grid.undulation(-90.0, 270.0), -100.0 + 0.5 * 23.0);
        // Negative longitudes wrap
        assert_eq!(grid.undulation(0.0, -90.0), grid.undulation(0.0, 270.0));
    }

    #[test]
    fn test_bilinear_and_wrap() {
        let grid = Egm96Grid::from_pgm(&small_pgm()).unwrap();
        // Halfway between columns 0 and 1 on the top row
        assert_eq!(grid.undulation(90.0, 45.0), -100.0 + 0.5 * 0.5);
        // Between column 3 and column 0 across the 360° seam
        assert_eq!(grid.undulation(90.0, 315.0), -100.0 + 0.5 * 1.5);
        // Halfway between rows 0 and 1 in column 0
        assert_eq!(grid.undulation(45.0, 0.0), -100.0 + 0.5 * 5.0);
    }

    #[test]
    fn test_malformed_pgm() {
        assert!(Egm96Grid::from_pgm(b"P2\n4 3\n65535\n").is_err());
        assert!(Egm96Grid::from_pgm(b"P5\n# Offset -100\n# Scale 0.5\n4 3\n65535\n\0\0").is_err());
        let no_scale = b"P5\n# Offset -100\n1 1\n65535\n".to_vec();
        assert!(Egm96Grid::from_pgm(&no_scale).is_err());
    }

    #[test]
    fn test_open_from_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(Egm96Grid::FILENAME), small_pgm()).unwrap();
        let grid = Egm96Grid::open(dir.path()).unwrap();
        assert_eq!(grid.undulation(90.0, 0.0), -100.0);
    }

    #[test]
    fn test_open_missing() {
        let dir = TempDir::new().unwrap();
        let err = Egm96Grid::open(dir.path()).unwrap_err();
        assert!(matches!(err, SrtmError::DatumResource { .. }));
    }

    #[test]
    fn test_to_ellipsoid() {
        let shape = RasterShape::new(2, 2);
        let (lons, lats) = coords(shape);
        let heights = Array2::from_vec(shape, vec![100.0, f32::NAN, 0.0, -5.5]).unwrap();

        let out = to_ellipsoid(&lons, &lats, &heights, f32::NAN, &Constant(47.123456789)).unwrap();
        assert_eq!(out.get(0, 0), Some(147.12346));
        assert!(out.get(0, 1).unwrap().is_nan());
        assert_eq!(out.get(1, 0), Some(47.12346));
        assert_eq!(out.get(1, 1), Some(41.62346));
    }

    #[test]
    fn test_no_op_is_error() {
        let shape = RasterShape::new(1, 3);
        let (lons, lats) = coords(shape);
        let heights = Array2::filled(shape, 10.0f32);
        let err = to_ellipsoid(&lons, &lats, &heights, f32::NAN, &Constant(0.0)).unwrap_err();
        assert!(matches!(err, SrtmError::DatumResource { .. }));
    }

    #[test]
    fn test_all_nan_passes_through() {
        let shape = RasterShape::new(2, 3);
        let (lons, lats) = coords(shape);
        let heights = Array2::filled(shape, f32::NAN);
        let out = to_ellipsoid(&lons, &lats, &heights, f32::NAN, &Constant(0.0)).unwrap();
        assert!(out.as_slice().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_nodata_sentinel_is_kept() {
        let shape = RasterShape::new(1, 3);
        let (lons, lats) = coords(shape);
        let heights = Array2::from_vec(shape, vec![100.0, -9999.0, -9999.0]).unwrap();

        let out = to_ellipsoid(&lons, &lats, &heights, -9999.0, &Constant(48.5)).unwrap();
        assert_eq!(out.as_slice(), &[148.5, -9999.0, -9999.0]);
    }

    #[test]
    fn test_only_nodata_passes_through() {
        let shape = RasterShape::new(2, 2);
        let (lons, lats) = coords(shape);
        let heights = Array2::filled(shape, -9999.0f32);
        let out = to_ellipsoid(&lons, &lats, &heights, -9999.0, &Constant(0.0)).unwrap();
        assert_eq!(out, heights);
    }

    #[test]
    fn test_shape_mismatch() {
        let (lons, lats) = coords(RasterShape::new(2, 2));
        let heights = Array2::filled(RasterShape::new(3, 2), 1.0f32);
        assert!(to_ellipsoid(&lons, &lats, &heights, f32::NAN, &Constant(1.0)).is_err());
    }
}
