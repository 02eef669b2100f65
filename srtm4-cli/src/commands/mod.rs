pub mod crop;
pub mod elevation;
pub mod fetch;
pub mod list;
pub mod which_tile;

use anyhow::{Context, Result};
use srtm4::{DownloadConfig, SrtmService, SrtmServiceBuilder};

use crate::GlobalOpts;

/// Build the service from the environment, overridden by command-line options.
pub fn build_service(opts: &GlobalOpts) -> Result<SrtmService> {
    let mut builder = SrtmServiceBuilder::from_env()
        .context("Cannot determine the cache directory. Use --cache-dir or set SRTM4_CACHE")?;

    if let Some(dir) = &opts.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(url) = &opts.url {
        builder = builder.download_config(DownloadConfig::with_base_url(url));
    }
    if let Some(path) = &opts.geoid_path {
        builder = builder.geoid_path(path);
    }
    if let Some(dir) = &opts.bin_dir {
        builder = builder.bin_dir(dir);
    }

    builder.build().context("Failed to create SRTM service")
}
