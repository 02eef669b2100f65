use anyhow::{Context, Result};

use crate::GlobalOpts;

pub fn run(opts: &GlobalOpts, lon: f64, lat: f64) -> Result<()> {
    let service = super::build_service(opts)?;
    let names = service
        .locate(&[(lon, lat)])
        .context("Failed to locate tile")?;

    for name in names {
        println!("{}", name);
    }
    Ok(())
}
