use crate::cli::{Args, PresenceArg};
use crate::crossref::CrossRefOptions;
use crate::error::{PresenceError, Result};
use crate::presence::PresenceConvention;
use std::path::PathBuf;
use std::time::Duration;

/// EPSG code of WGS84, the default working CRS.
pub const DEFAULT_EPSG: u32 = 4326;

/// How the AOI's spatial reference is checked and reconciled.
#[derive(Debug, Clone, PartialEq)]
pub struct CrsConfig {
    /// Canonical working CRS every AOI and raster is brought into
    pub canonical_epsg: u32,
    /// CRS assumed for an AOI that declares none
    pub fallback_aoi_epsg: Option<u32>,
}

impl Default for CrsConfig {
    fn default() -> Self {
        Self {
            canonical_epsg: DEFAULT_EPSG,
            fallback_aoi_epsg: None,
        }
    }
}

/// Everything one batch run needs; passed explicitly, never global.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub raster_sources: Vec<PathBuf>,
    pub aoi_path: PathBuf,
    pub presence: PresenceConvention,
    pub crs: CrsConfig,
    pub recursive: bool,
    pub all_touched: bool,
    pub timeout: Option<Duration>,
}

impl BatchConfig {
    pub fn new(
        raster_sources: Vec<PathBuf>,
        aoi_path: impl Into<PathBuf>,
        presence: PresenceConvention,
    ) -> Self {
        Self {
            raster_sources,
            aoi_path: aoi_path.into(),
            presence,
            crs: CrsConfig::default(),
            recursive: false,
            all_touched: false,
            timeout: None,
        }
    }
}

/// Full configuration of a command-line run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub batch: BatchConfig,
    pub output: PathBuf,
    pub database: Option<PathBuf>,
    pub crossref: CrossRefOptions,
}

impl AppConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let presence = match args.presence {
            PresenceArg::AnyPositive => PresenceConvention::AnyPositive,
            PresenceArg::ExactMarker => PresenceConvention::ExactMarker(args.marker),
        };

        let batch = BatchConfig {
            raster_sources: args.rasters.clone(),
            aoi_path: args.aoi.clone(),
            presence,
            crs: CrsConfig {
                canonical_epsg: args.epsg,
                fallback_aoi_epsg: args.aoi_epsg,
            },
            recursive: args.recursive,
            all_touched: args.all_touched,
            timeout: args.timeout.map(Duration::from_secs),
        };

        let delimiter = args
            .delimiter
            .as_deref()
            .map(parse_delimiter)
            .transpose()?;

        let output_dir = args
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            batch,
            output: args.output.clone(),
            database: args.database.clone(),
            crossref: CrossRefOptions {
                delimiter,
                output_dir,
            },
        })
    }
}

/// Parse a delimiter given on the command line.
pub fn parse_delimiter(value: &str) -> Result<u8> {
    match value {
        "tab" | "TAB" | "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => Err(PresenceError::InvalidDelimiter(other.to_string())),
    }
}
