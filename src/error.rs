use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("No TIFF rasters found in the provided sources: {0:?}")]
    NoTiffsFound(Vec<PathBuf>),

    #[error("Invalid area of interest {path}: {reason}")]
    InvalidAoi { path: PathBuf, reason: String },

    #[error("CRS error: {0}")]
    InvalidCrs(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Delimited file error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Raster band {0} does not exist")]
    MissingBand(usize),

    #[error("Reprojection failed: {0}")]
    Reprojection(String),

    #[error("No species name column found in {0}")]
    MissingSpeciesColumn(PathBuf),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid delimiter: {0:?} (must be a single ASCII character or 'tab')")]
    InvalidDelimiter(String),
}

impl PresenceError {
    /// Errors that invalidate the whole batch rather than a single raster.
    ///
    /// `InvalidCrs` is not listed: it is fatal when raised for the AOI and
    /// per-file when raised for a raster, so the caller decides by context.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            PresenceError::NoTiffsFound(_) | PresenceError::InvalidAoi { .. }
        )
    }

    pub(crate) fn invalid_aoi(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PresenceError::InvalidAoi {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PresenceError>;
