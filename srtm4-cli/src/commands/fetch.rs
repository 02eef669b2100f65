use anyhow::{Context, Result};
use srtm4::{parse_tile_name, TileStatus};

use crate::GlobalOpts;

pub fn run(opts: &GlobalOpts, tiles: &[String]) -> Result<()> {
    let ids = tiles
        .iter()
        .map(|name| parse_tile_name(name).with_context(|| format!("Invalid tile name: {}", name)))
        .collect::<Result<Vec<_>>>()?;

    let service = super::build_service(opts)?;

    for id in ids {
        match service
            .ensure_tile(id)
            .with_context(|| format!("Failed to fetch {}", id))?
        {
            TileStatus::Complete(path) => println!("{}\t{}", id, path.display()),
            TileStatus::Unavailable => println!("{}\tunavailable", id),
        }
    }

    Ok(())
}
