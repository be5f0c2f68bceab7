use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "species-presence")]
#[command(about = "List the species whose presence rasters intersect an area of interest")]
#[command(version)]
pub struct Args {
    /// Directory or GeoTIFF file with species rasters (repeatable)
    #[arg(short, long, value_name = "PATH", required = true)]
    pub rasters: Vec<PathBuf>,

    /// Area of interest polygon dataset (Shapefile, GeoJSON, GPKG...)
    #[arg(short, long, value_name = "FILE")]
    pub aoi: PathBuf,

    /// Output species list (delimited text)
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Rule deciding whether a masked raster shows presence
    #[arg(short, long, value_enum, default_value_t = PresenceArg::AnyPositive)]
    pub presence: PresenceArg,

    /// Pixel value marking presence with --presence exact-marker
    #[arg(long, value_name = "VALUE", default_value_t = 1.0)]
    pub marker: f64,

    /// Canonical working CRS (EPSG code)
    #[arg(long, value_name = "CODE", default_value_t = crate::config::DEFAULT_EPSG)]
    pub epsg: u32,

    /// CRS to assume when the AOI declares none (EPSG code)
    #[arg(long, value_name = "CODE")]
    pub aoi_epsg: Option<u32>,

    /// Count pixels touched by the AOI boundary, not only those with their centre inside
    #[arg(long)]
    pub all_touched: bool,

    /// Scan raster directories recursively
    #[arg(long)]
    pub recursive: bool,

    /// External species database to cross-reference (CSV/TSV)
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Database delimiter, e.g. ',' ';' or 'tab' (default: from extension)
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<String>,

    /// Give up on the remaining rasters after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceArg {
    /// Any pixel strictly greater than zero (probability rasters)
    AnyPositive,
    /// Any pixel equal to --marker (categorical binary rasters)
    ExactMarker,
}
