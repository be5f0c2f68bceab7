use crate::aoi::{self, AreaOfInterest};
use crate::config::CrsConfig;
use crate::error::{PresenceError, Result};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::LayerAccess;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Sibling folder receiving reprojected copies of an AOI.
pub const RECONCILED_DIR: &str = "reprojected_aoi";

/// Spatial reference for an EPSG code, in lon/lat (x, y) axis order
pub fn srs_from_epsg(epsg: u32) -> Result<SpatialRef> {
    let srs = SpatialRef::from_epsg(epsg)
        .map_err(|e| PresenceError::InvalidCrs(format!("unknown EPSG code {}: {}", epsg, e)))?;
    Ok(gis_order(&srs))
}

/// Copy of `srs` using traditional GIS axis order (x = easting/longitude).
///
/// GDAL 3 otherwise follows the authority axis order, which puts latitude
/// first for EPSG:4326 and would swap every coordinate we transform.
pub fn gis_order(srs: &SpatialRef) -> SpatialRef {
    let mut srs = srs.clone();
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    srs
}

/// Parse the spatial reference of a raster from its projection WKT.
///
/// An empty projection means the raster carries no CRS at all.
pub fn srs_from_wkt(projection_wkt: &str) -> Result<SpatialRef> {
    if projection_wkt.trim().is_empty() {
        return Err(PresenceError::InvalidCrs(
            "raster has no coordinate reference system".to_string(),
        ));
    }
    let srs = SpatialRef::from_wkt(projection_wkt)
        .map_err(|e| PresenceError::InvalidCrs(format!("unreadable projection: {}", e)))?;
    Ok(gis_order(&srs))
}

/// EPSG code of a spatial reference, identifying it when the definition
/// carries no authority (ESRI .prj files usually don't).
pub fn epsg_code(srs: &SpatialRef) -> Option<u32> {
    let authority_code = |s: &SpatialRef| match (s.auth_name(), s.auth_code()) {
        (Ok(name), Ok(code)) if name.eq_ignore_ascii_case("EPSG") => u32::try_from(code).ok(),
        _ => None,
    };

    if let Some(code) = authority_code(srs) {
        return Some(code);
    }

    let mut identified = srs.clone();
    match identified.auto_identify_epsg() {
        Ok(()) => authority_code(&identified),
        Err(e) => {
            debug!("Could not identify EPSG code: {}", e);
            None
        }
    }
}

/// Whether `srs` is the canonical working CRS.
pub fn is_canonical(srs: &SpatialRef, canonical_epsg: u32) -> bool {
    if let Some(code) = epsg_code(srs) {
        return code == canonical_epsg;
    }

    // No authority could be determined; fall back to an equivalence test
    match SpatialRef::from_epsg(canonical_epsg) {
        Ok(canonical) => *srs == canonical,
        Err(_) => false,
    }
}

/// Short human-readable label for logs
pub fn describe(srs: &SpatialRef) -> String {
    match epsg_code(srs) {
        Some(code) => format!("EPSG:{}", code),
        None => srs.name().unwrap_or_else(|_| "unnamed CRS".to_string()),
    }
}

/// Coordinate transform between two spatial references, both in GIS axis order
pub fn transform_between(source: &SpatialRef, target: &SpatialRef) -> Result<CoordTransform> {
    let source = gis_order(source);
    let target = gis_order(target);
    CoordTransform::new(&source, &target).map_err(|e| {
        PresenceError::InvalidCrs(format!(
            "no transform from {} to {}: {}",
            describe(&source),
            describe(&target),
            e
        ))
    })
}

/// Path where the reconciled copy of `aoi_path` is written.
pub fn reconciled_path(aoi_path: &Path) -> Result<PathBuf> {
    let file_name = aoi_path
        .file_name()
        .ok_or_else(|| PresenceError::invalid_aoi(aoi_path, "path has no file name"))?;
    let parent = aoi_path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(RECONCILED_DIR).join(file_name))
}

/// Make sure the AOI at `aoi_path` is expressed in the canonical CRS.
///
/// Returns `aoi_path` itself when it already is. Otherwise every feature is
/// reprojected and written, with the source's driver and attributes, to
/// [`reconciled_path`]; that new path is returned. The source is never
/// modified.
pub fn reconcile_aoi(aoi_path: &Path, config: &CrsConfig) -> Result<PathBuf> {
    info!("Checking CRS of area of interest: {}", aoi_path.display());
    let source = aoi::open_layer_dataset(aoi_path)?;
    let layer = source
        .layer(0)
        .map_err(|e| PresenceError::invalid_aoi(aoi_path, e))?;
    if layer.feature_count() == 0 {
        return Err(PresenceError::invalid_aoi(
            aoi_path,
            "dataset contains no features",
        ));
    }

    let declared = aoi::layer_srs(&layer);
    let source_srs = match (declared, config.fallback_aoi_epsg) {
        (Some(srs), _) => srs,
        (None, Some(epsg)) => {
            warn!(
                "AOI {} declares no CRS, assuming EPSG:{}",
                aoi_path.display(),
                epsg
            );
            srs_from_epsg(epsg)?
        }
        (None, None) => {
            return Err(PresenceError::InvalidCrs(format!(
                "area of interest {} has no CRS and none was given to assume",
                aoi_path.display()
            )))
        }
    };

    if is_canonical(&source_srs, config.canonical_epsg) {
        info!(
            "AOI already in EPSG:{}, using it unchanged",
            config.canonical_epsg
        );
        return Ok(aoi_path.to_path_buf());
    }

    let target_srs = srs_from_epsg(config.canonical_epsg)?;
    info!(
        "Reprojecting AOI from {} to EPSG:{}",
        describe(&source_srs),
        config.canonical_epsg
    );

    let destination = reconciled_path(aoi_path)?;
    let written = aoi::write_reprojected(&source, &destination, &source_srs, &target_srs)?;
    info!(
        "Wrote {} reprojected features to {}",
        written,
        destination.display()
    );

    // Re-open to confirm the copy is readable before handing it out
    AreaOfInterest::open(&destination)?;
    Ok(destination)
}
