use crate::aoi::AreaOfInterest;
use crate::config::{BatchConfig, CrsConfig};
use crate::crs;
use crate::error::{PresenceError, Result};
use crate::io::{GridSource, OpenRaster};
use crate::names;
use crate::presence::{self, MaskOptions};
use crate::reproject;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared flag asking a running batch to stop before its next raster.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Classification of a single raster
#[derive(Debug)]
pub enum RasterOutcome {
    Present,
    Absent,
    Failed(PresenceError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Number of distinct species present; always `present_species.len()`
    pub present_count: usize,
    /// Canonical names, sorted and unique
    pub present_species: Vec<String>,
    /// Rasters that could not be evaluated, or were present but yield no
    /// species name
    pub problematic_files: Vec<PathBuf>,
    pub absent_count: usize,
    /// Rasters skipped because the run was cancelled or ran out of time
    pub unprocessed_files: Vec<PathBuf>,
}

/// Evaluate every raster of the configured sources against the AOI.
pub fn run(config: &BatchConfig) -> Result<BatchResult> {
    run_with_cancel(config, &CancelToken::new())
}

/// Like [`run`], stopping early when `cancel` is tripped or the configured
/// timeout expires. Rasters not attempted are listed in
/// [`BatchResult::unprocessed_files`].
///
/// Only source enumeration and AOI loading fail the whole batch; any error
/// on a single raster marks that raster as problematic.
pub fn run_with_cancel(config: &BatchConfig, cancel: &CancelToken) -> Result<BatchResult> {
    let started = Instant::now();
    let deadline = config.timeout.map(|timeout| started + timeout);

    let rasters = crate::sources::enumerate_rasters(&config.raster_sources, config.recursive)?;
    let aoi = load_aoi(&config.aoi_path, &config.crs)?;
    info!(
        "Evaluating {} raster(s) against {} AOI polygon(s)",
        rasters.len(),
        aoi.len()
    );

    let mut present = BTreeSet::new();
    let mut result = BatchResult::default();

    for (i, path) in rasters.iter().enumerate() {
        let timed_out = deadline.is_some_and(|d| Instant::now() >= d);
        if cancel.is_cancelled() || timed_out {
            warn!(
                "Batch {} after {} of {} raster(s)",
                if timed_out { "timed out" } else { "cancelled" },
                i,
                rasters.len()
            );
            result.unprocessed_files = rasters[i..].to_vec();
            break;
        }

        match evaluate_raster(path, &aoi, config) {
            RasterOutcome::Present => {
                let name = names::species_name(path);
                debug!("PRESENT: {} ({})", path.display(), name);
                if name.is_empty() {
                    warn!("No species name can be derived from {}", path.display());
                    result.problematic_files.push(path.clone());
                } else {
                    present.insert(name);
                }
            }
            RasterOutcome::Absent => {
                debug!("ABSENT: {}", path.display());
                result.absent_count += 1;
            }
            RasterOutcome::Failed(e) => {
                warn!("Failed to process {}: {}", path.display(), e);
                result.problematic_files.push(path.clone());
            }
        }
    }

    result.present_species = present.into_iter().collect();
    result.present_count = result.present_species.len();

    info!(
        "{} species present, {} raster(s) absent, {} problematic, {} unprocessed ({:.2?})",
        result.present_count,
        result.absent_count,
        result.problematic_files.len(),
        result.unprocessed_files.len(),
        started.elapsed()
    );
    Ok(result)
}

/// Open the AOI and bring it into the canonical CRS in memory.
pub fn load_aoi(path: &Path, config: &CrsConfig) -> Result<AreaOfInterest> {
    let mut aoi = AreaOfInterest::open(path)?;

    if aoi.srs().is_none() {
        let epsg = config.fallback_aoi_epsg.ok_or_else(|| {
            PresenceError::InvalidCrs(format!(
                "area of interest {} has no CRS",
                path.display()
            ))
        })?;
        warn!("AOI {} declares no CRS, assuming EPSG:{}", path.display(), epsg);
        aoi = aoi.with_assumed_srs(crs::srs_from_epsg(epsg)?);
    }

    if aoi
        .srs()
        .is_some_and(|srs| crs::is_canonical(srs, config.canonical_epsg))
    {
        return Ok(aoi);
    }

    info!(
        "AOI is not in EPSG:{}, reprojecting it in memory",
        config.canonical_epsg
    );
    aoi.to_crs(&crs::srs_from_epsg(config.canonical_epsg)?)
}

/// Classify one raster. Never fails: errors become [`RasterOutcome::Failed`].
///
/// `aoi` must already be in the canonical CRS.
pub fn evaluate_raster(path: &Path, aoi: &AreaOfInterest, config: &BatchConfig) -> RasterOutcome {
    match presence_in_raster(path, aoi, config) {
        Ok(true) => RasterOutcome::Present,
        Ok(false) => RasterOutcome::Absent,
        Err(e) => RasterOutcome::Failed(e),
    }
}

fn presence_in_raster(path: &Path, aoi: &AreaOfInterest, config: &BatchConfig) -> Result<bool> {
    let options = MaskOptions {
        all_touched: config.all_touched,
    };
    let raster = OpenRaster::open(path)?;
    let srs = raster.metadata().srs()?;

    if crs::is_canonical(&srs, config.crs.canonical_epsg) {
        return presence::evaluate(&raster, aoi, config.presence, &options);
    }

    let canonical = crs::srs_from_epsg(config.crs.canonical_epsg)?;
    debug!(
        "Reprojecting {} from {} before masking",
        path.display(),
        crs::describe(&srs)
    );
    let warped = reproject::reproject(&raster, &canonical)?;
    drop(raster);
    presence::evaluate(&warped, aoi, config.presence, &options)
}
