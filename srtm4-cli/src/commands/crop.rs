use anyhow::{bail, Context, Result};
use serde::Serialize;
use srtm4::{write_mosaic, Bounds, Datum};
use std::path::PathBuf;

use crate::GlobalOpts;

#[derive(Serialize)]
struct CropSummary {
    output: PathBuf,
    rows: usize,
    cols: usize,
    transform: [f64; 6],
    crs: String,
    datum: String,
    valid_pixels: usize,
}

pub fn run(
    opts: &GlobalOpts,
    bounds: &[f64],
    datum: Option<Datum>,
    output: PathBuf,
    json: bool,
) -> Result<()> {
    let &[west, south, east, north] = bounds else {
        bail!("--bounds takes exactly 4 values: WEST SOUTH EAST NORTH");
    };

    let service = super::build_service(opts)?;
    let datum = datum.unwrap_or_else(|| service.default_datum());

    let mosaic = service
        .crop(&Bounds::new(west, south, east, north), datum)
        .context("Failed to crop DEM")?;

    let Some(mosaic) = mosaic else {
        bail!("Bounds lie outside SRTM coverage (latitudes -60 to 60)");
    };

    write_mosaic(&output, &mosaic)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let valid_pixels = mosaic
        .data
        .as_slice()
        .iter()
        .filter(|v| !v.is_nan() && **v != mosaic.nodata)
        .count();

    if json {
        let summary = CropSummary {
            output,
            rows: mosaic.data.rows(),
            cols: mosaic.data.cols(),
            transform: mosaic.transform.to_array(),
            crs: format!("EPSG:{}", mosaic.crs_epsg),
            datum: mosaic.datum.to_string(),
            valid_pixels,
        };
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "{} ({} x {}, {} valid pixels, {})",
            output.display(),
            mosaic.data.cols(),
            mosaic.data.rows(),
            valid_pixels,
            mosaic.datum
        );
    }

    Ok(())
}
