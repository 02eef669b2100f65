use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use srtm4::Datum;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// SRTM 5x5 degree tile cache and DEM crop tool
#[derive(Parser)]
#[command(name = "srtm4-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Clone)]
pub struct GlobalOpts {
    /// Directory of cached tiles (default: ~/.srtm)
    #[arg(short, long, env = "SRTM4_CACHE", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Base URL of the tile archives
    #[arg(long, env = "SRTM4_URL", global = true)]
    pub url: Option<String>,

    /// EGM96 grid file, or directory containing egm96-15.pgm
    #[arg(long, env = "GEOID_PATH", global = true)]
    pub geoid_path: Option<PathBuf>,

    /// Directory containing srtm4_which_tile and srtm4
    #[arg(long, env = "SRTM4_BIN", global = true)]
    pub bin_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop a pixel-aligned DEM and write it as GeoTIFF
    Crop {
        /// West, south, east and north bounds in degrees
        #[arg(long, num_args = 4, value_names = ["WEST", "SOUTH", "EAST", "NORTH"], allow_negative_numbers = true)]
        bounds: Vec<f64>,

        /// Vertical datum: orthometric or ellipsoidal
        #[arg(long)]
        datum: Option<Datum>,

        /// Output GeoTIFF
        #[arg(short, long)]
        output: PathBuf,

        /// Print a JSON summary
        #[arg(short, long)]
        json: bool,
    },

    /// Download tiles into the cache
    Fetch {
        /// Tile names, e.g. srtm_37_04
        #[arg(required = true)]
        tiles: Vec<String>,
    },

    /// Print the tile containing a coordinate
    WhichTile {
        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
    },

    /// Query the height at a coordinate with the external srtm4 program
    Elevation {
        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List cached tiles
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "srtm4=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crop {
            bounds,
            datum,
            output,
            json,
        } => commands::crop::run(&cli.global, &bounds, datum, output, json),
        Commands::Fetch { tiles } => commands::fetch::run(&cli.global, &tiles),
        Commands::WhichTile { lon, lat } => commands::which_tile::run(&cli.global, lon, lat),
        Commands::Elevation { lon, lat, json } => {
            commands::elevation::run(&cli.global, lon, lat, json)
        }
        Commands::List => commands::list::run(&cli.global),
    }
}
