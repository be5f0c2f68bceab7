use crate::crs;
use crate::error::{PresenceError, Result};
use crate::window::PixelWindow;
use gdal::raster::{Buffer, RasterBand};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, GeoTransform};
use log::{debug, info};
use ndarray::{s, Array2};
use std::fs;
use std::path::Path;

/// Header of the species list column
pub const SPECIES_HEADER: &str = "species";

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: GeoTransform,
    pub projection: String,
    pub nodata: Option<f64>,
}

impl RasterMetadata {
    /// Spatial reference of the raster; `InvalidCrs` if it declares none
    pub fn srs(&self) -> Result<SpatialRef> {
        crs::srs_from_wkt(&self.projection)
    }

    pub fn full_window(&self) -> PixelWindow {
        PixelWindow::full(self.width, self.height)
    }

    fn check_window(&self, window: &PixelWindow) -> Result<()> {
        if window.x_max > self.width || window.y_max > self.height {
            return Err(PresenceError::InvalidDimensions(window.x_max, window.y_max));
        }
        Ok(())
    }
}

/// Anything that can hand out windows of raster values.
///
/// Band indices are 1-based, as in GDAL.
pub trait GridSource {
    fn metadata(&self) -> &RasterMetadata;

    fn read_window(&self, band_index: usize, window: &PixelWindow) -> Result<Array2<f64>>;
}

/// A raster file opened for windowed reads. The file handle is released when
/// this value is dropped.
pub struct OpenRaster {
    dataset: Dataset,
    metadata: RasterMetadata,
}

impl OpenRaster {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening raster: {}", path.display());
        let dataset = Dataset::open(path)?;
        let metadata = read_metadata(&dataset)?;
        Ok(Self {
            dataset,
            metadata,
        })
    }
}

impl GridSource for OpenRaster {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn read_window(&self, band_index: usize, window: &PixelWindow) -> Result<Array2<f64>> {
        self.metadata.check_window(window)?;
        let band = self.dataset.rasterband(band_index)?;
        read_band_window(&band, window)
    }
}

/// Raster values held in memory, one array per band.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    bands: Vec<Array2<f64>>,
    metadata: RasterMetadata,
}

impl RasterGrid {
    pub fn new(bands: Vec<Array2<f64>>, mut metadata: RasterMetadata) -> Result<Self> {
        if bands.is_empty() || metadata.width == 0 || metadata.height == 0 {
            return Err(PresenceError::InvalidDimensions(
                metadata.width,
                metadata.height,
            ));
        }
        for band in &bands {
            let (rows, cols) = band.dim();
            if rows != metadata.height || cols != metadata.width {
                return Err(PresenceError::InvalidDimensions(cols, rows));
            }
        }
        metadata.band_count = bands.len();
        Ok(Self { bands, metadata })
    }

    pub fn bands(&self) -> &[Array2<f64>] {
        &self.bands
    }
}

impl GridSource for RasterGrid {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn read_window(&self, band_index: usize, window: &PixelWindow) -> Result<Array2<f64>> {
        self.metadata.check_window(window)?;
        let band = band_index
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or(PresenceError::MissingBand(band_index))?;
        Ok(band
            .slice(s![window.y_min..window.y_max, window.x_min..window.x_max])
            .to_owned())
    }
}

/// Extract metadata from a dataset without reading any pixels
pub fn read_metadata(dataset: &Dataset) -> Result<RasterMetadata> {
    let band_count = dataset.raster_count();
    let (width, height) = dataset.raster_size();

    if band_count == 0 || width == 0 || height == 0 {
        return Err(PresenceError::InvalidDimensions(width, height));
    }

    let rasterband: RasterBand = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value();
    let geotransform = dataset.geo_transform()?;

    debug!(
        "Raster {}x{}, {} band(s), nodata {:?}",
        width, height, band_count, nodata
    );

    Ok(RasterMetadata {
        width,
        height,
        band_count,
        geotransform,
        projection: dataset.projection(),
        nodata,
    })
}

/// Read one window of a band as `f64`
pub fn read_band_window(band: &RasterBand, window: &PixelWindow) -> Result<Array2<f64>> {
    let (width, height) = (window.width(), window.height());
    if width == 0 || height == 0 {
        return Ok(Array2::zeros((height, width)));
    }

    let buffer = band.read_as::<f64>(
        (window.x_min as isize, window.y_min as isize),
        (width, height),
        (width, height),
        None,
    )?;
    let values: Vec<f64> = buffer.into_iter().collect();
    Ok(Array2::from_shape_vec((height, width), values)?)
}

/// Write a grid to a Float32 GeoTIFF, one band per array.
pub fn write_geotiff(path: &Path, grid: &RasterGrid) -> Result<()> {
    let metadata = grid.metadata();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f32, _>(
        path,
        metadata.width,
        metadata.height,
        grid.bands.len(),
    )?;

    dataset.set_geo_transform(&metadata.geotransform)?;
    dataset.set_projection(&metadata.projection)?;

    for (i, band_data) in grid.bands.iter().enumerate() {
        let mut band = dataset.rasterband(i + 1)?;
        let values: Vec<f32> = band_data.iter().map(|&v| v as f32).collect();
        let mut buffer = Buffer::new((metadata.width, metadata.height), values);
        band.write((0, 0), (metadata.width, metadata.height), &mut buffer)?;
        if metadata.nodata.is_some() {
            band.set_no_data_value(metadata.nodata)?;
        }
    }

    debug!("Wrote {} band(s) to {}", grid.bands.len(), path.display());
    Ok(())
}

/// Write the species list as a one-column delimited file.
pub fn write_species_list<S: AsRef<str>>(path: &Path, species: &[S]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([SPECIES_HEADER])?;
    for name in species {
        writer.write_record([name.as_ref()])?;
    }
    writer.flush()?;

    info!("Wrote {} species to {}", species.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn wgs84_metadata(width: usize, height: usize, nodata: Option<f64>) -> RasterMetadata {
        RasterMetadata {
            width,
            height,
            band_count: 1,
            geotransform: [0.0, 1.0, 0.0, height as f64, 0.0, -1.0],
            projection: crs::srs_from_epsg(4326).unwrap().to_wkt().unwrap(),
            nodata,
        }
    }

    #[test]
    fn test_grid_rejects_mismatched_band() {
        let result = RasterGrid::new(vec![Array2::zeros((2, 3))], wgs84_metadata(3, 3, None));
        assert!(matches!(result, Err(PresenceError::InvalidDimensions(3, 2))));
    }

    #[test]
    fn test_grid_window_read() {
        let data = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let grid = RasterGrid::new(vec![data], wgs84_metadata(3, 3, None)).unwrap();
        let window = PixelWindow { x_min: 1, y_min: 1, x_max: 3, y_max: 3 };
        assert_eq!(grid.read_window(1, &window).unwrap(), array![[5.0, 6.0], [8.0, 9.0]]);
        assert!(matches!(
            grid.read_window(2, &window),
            Err(PresenceError::MissingBand(2))
        ));
        let too_wide = PixelWindow { x_min: 0, y_min: 0, x_max: 4, y_max: 1 };
        assert!(grid.read_window(1, &too_wide).is_err());
    }

    #[test]
    fn test_geotiff_write_and_read_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sp.tif");
        let data = array![[0.0, 1.0], [-9999.0, 0.5]];
        let grid = RasterGrid::new(vec![data], wgs84_metadata(2, 2, Some(-9999.0))).unwrap();
        write_geotiff(&path, &grid).unwrap();

        let raster = OpenRaster::open(&path).unwrap();
        let meta = raster.metadata();
        assert_eq!((meta.width, meta.height, meta.band_count), (2, 2, 1));
        assert_eq!(meta.nodata, Some(-9999.0));
        assert!(crs::is_canonical(&meta.srs().unwrap(), 4326));

        let values = raster.read_window(1, &meta.full_window()).unwrap();
        assert_eq!(values, array![[0.0, 1.0], [-9999.0, 0.5]]);
    }

    #[test]
    fn test_open_non_raster_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tif");
        fs::write(&path, b"not a tiff").unwrap();
        assert!(OpenRaster::open(&path).is_err());
    }

    #[test]
    fn test_species_list_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("species.csv");
        write_species_list(&path, &["Puma concolor", "Tapirus bairdii"]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "species\nPuma concolor\nTapirus bairdii\n");
    }
}
