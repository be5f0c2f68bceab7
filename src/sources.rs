use crate::error::{PresenceError, Result};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions recognised as GeoTIFF, compared case-insensitively
pub const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

pub fn is_raster_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| RASTER_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Collect candidate rasters from directories and individual files.
///
/// Directories are scanned one level deep unless `recursive` is set. File
/// paths are taken as given, whatever their extension. The result is sorted
/// and free of duplicates; `NoTiffsFound` if it is empty.
pub fn enumerate_rasters(sources: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut rasters = BTreeSet::new();

    for source in sources {
        if source.is_file() {
            rasters.insert(source.clone());
        } else if source.is_dir() {
            let found = scan_directory(source, recursive);
            debug!("{} raster(s) in {}", found.len(), source.display());
            rasters.extend(found);
        } else {
            warn!("Raster source does not exist, skipping: {}", source.display());
        }
    }

    if rasters.is_empty() {
        return Err(PresenceError::NoTiffsFound(sources.to_vec()));
    }

    info!(
        "Found {} candidate raster(s) in {} source(s)",
        rasters.len(),
        sources.len()
    );
    Ok(rasters.into_iter().collect())
}

fn scan_directory(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_raster_path(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}
