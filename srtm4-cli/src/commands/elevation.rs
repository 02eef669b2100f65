use anyhow::{Context, Result};
use serde::Serialize;

use crate::GlobalOpts;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
}

pub fn run(opts: &GlobalOpts, lon: f64, lat: f64, json: bool) -> Result<()> {
    let service = super::build_service(opts)?;

    let heights = service
        .point_elevations(&[(lon, lat)])
        .context("Failed to get elevation")?;
    let elevation = heights.first().copied().filter(|h| h.is_finite());

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else if let Some(elev) = elevation {
        println!("{:.2}", elev);
    } else {
        println!("void");
    }

    Ok(())
}
