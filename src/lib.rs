// Library exports for testing and reuse

pub mod aoi;
pub mod batch;
pub mod cli;
pub mod config;
pub mod crossref;
pub mod crs;
pub mod error;
pub mod io;
pub mod names;
pub mod presence;
pub mod reproject;
pub mod sources;
pub mod window;

// Re-export commonly used types
pub use aoi::AreaOfInterest;
pub use batch::{run, run_with_cancel, BatchResult, CancelToken, RasterOutcome};
pub use config::{AppConfig, BatchConfig, CrsConfig};
pub use crossref::{cross_reference, CrossRefOptions, CrossReference};
pub use crs::reconcile_aoi;
pub use error::{PresenceError, Result};
pub use io::{GridSource, OpenRaster, RasterGrid, RasterMetadata};
pub use names::{canonical_species, canonicalize};
pub use presence::{MaskOptions, PresenceConvention};
