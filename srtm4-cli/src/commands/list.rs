use anyhow::{Context, Result};
use std::fs;

use crate::GlobalOpts;

pub fn run(opts: &GlobalOpts) -> Result<()> {
    let service = super::build_service(opts)?;
    let dir = service.cache_dir();

    let tiles = service
        .cache()
        .cached_tiles()
        .context("Failed to read cache directory")?;

    if tiles.is_empty() {
        println!("No tiles cached in: {}", dir.display());
        return Ok(());
    }

    println!("{:<12} {:>12} {:>28}", "TILE", "SIZE", "COVERAGE");
    println!("{}", "-".repeat(54));

    let mut total_size: u64 = 0;
    for id in &tiles {
        let path = service.cache().tile_path(*id);
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        total_size += size;

        let (west, north) = (id.west(), id.north());
        let coverage = format!(
            "{} to {}, {} to {}",
            format_lon(west),
            format_lon(west + 5.0),
            format_lat(north - 5.0),
            format_lat(north)
        );

        println!("{:<12} {:>12} {:>28}", id.name(), format_size(size), coverage);
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", tiles.len());
    println!("  Total size: {}", format_size(total_size));
    println!("  Cache directory: {}", dir.display());

    Ok(())
}

fn format_lon(lon: f64) -> String {
    let prefix = if lon >= 0.0 { "E" } else { "W" };
    format!("{}{:03}", prefix, lon.abs() as i32)
}

fn format_lat(lat: f64) -> String {
    let prefix = if lat >= 0.0 { "N" } else { "S" };
    format!("{}{:02}", prefix, lat.abs() as i32)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
