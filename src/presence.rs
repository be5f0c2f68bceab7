use crate::aoi::AreaOfInterest;
use crate::error::Result;
use crate::io::GridSource;
use crate::window::PixelWindow;
use gdal::raster::{rasterize, RasterizeOptions};
use gdal::DriverManager;
use log::debug;
use ndarray::{Array2, Zip};
use rayon::prelude::*;

/// Rows masked and scanned at a time; the scan stops at the first hit.
const STRIP_ROWS: usize = 512;

/// Rule deciding whether a pixel value means "species present".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PresenceConvention {
    /// Any value strictly greater than zero (continuous probability rasters)
    AnyPositive,
    /// Exactly this value (binary/categorical rasters, usually 1)
    ExactMarker(f64),
}

impl PresenceConvention {
    pub fn is_present(&self, value: f64) -> bool {
        match self {
            PresenceConvention::AnyPositive => value > 0.0,
            PresenceConvention::ExactMarker(marker) => value == *marker,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskOptions {
    /// Keep every pixel touched by a polygon, not only those whose centre
    /// falls inside
    pub all_touched: bool,
}

/// Window of a raster clipped to the AOI polygons.
///
/// Pixels outside every polygon hold `nodata`.
#[derive(Debug, Clone)]
pub struct MaskedResult {
    pub window: PixelWindow,
    pub bands: Vec<Array2<f64>>,
    pub nodata: f64,
}

impl MaskedResult {
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || value == self.nodata
    }

    /// Whether any valid pixel of any band satisfies `convention`
    pub fn shows_presence(&self, convention: PresenceConvention) -> bool {
        let hit = |&value: &f64| !self.is_nodata(value) && convention.is_present(value);
        let row_len = self.window.width().max(1);

        self.bands.iter().any(|band| match band.as_slice() {
            Some(values) => values
                .par_chunks(row_len)
                .any(|row| row.iter().any(hit)),
            None => band.iter().any(hit),
        })
    }

    /// Number of pixels inside the AOI with a valid value, summed over bands
    pub fn valid_pixels(&self) -> usize {
        self.bands
            .iter()
            .map(|band| band.iter().filter(|&&v| !self.is_nodata(v)).count())
            .sum()
    }
}

/// Clip `window` of `source` to the AOI polygons.
///
/// The polygons are burned into an in-memory byte mask aligned with the
/// window; band values where the mask is zero become the raster's nodata
/// value, or NaN when it declares none.
pub fn mask<G: GridSource + ?Sized>(
    source: &G,
    aoi: &AreaOfInterest,
    window: &PixelWindow,
    options: &MaskOptions,
) -> Result<MaskedResult> {
    let metadata = source.metadata();
    let nodata = metadata.nodata.unwrap_or(f64::NAN);
    let (width, height) = (window.width(), window.height());

    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut mask_dataset = driver.create_with_band_type::<u8, _>("", width, height, 1)?;
    mask_dataset.set_geo_transform(&window.geotransform(&metadata.geotransform))?;

    let burn_values = vec![1.0; aoi.len()];
    rasterize(
        &mut mask_dataset,
        &[1],
        aoi.geometries(),
        &burn_values,
        Some(RasterizeOptions {
            all_touched: options.all_touched,
            ..Default::default()
        }),
    )?;

    let mask_values = mask_dataset
        .rasterband(1)?
        .read_as::<u8>((0, 0), (width, height), (width, height), None)?;
    let inside: Array2<u8> =
        Array2::from_shape_vec((height, width), mask_values.into_iter().collect())?;

    let mut bands = Vec::with_capacity(metadata.band_count);
    for band_index in 1..=metadata.band_count {
        let mut values = source.read_window(band_index, window)?;
        Zip::from(&mut values).and(&inside).for_each(|value, &flag| {
            if flag == 0 {
                *value = nodata;
            }
        });
        bands.push(values);
    }

    Ok(MaskedResult {
        window: *window,
        bands,
        nodata,
    })
}

/// Decide whether the species of `source` is present inside the AOI.
///
/// `source` and `aoi` must share a CRS. An AOI that does not overlap the
/// raster means absent, not an error.
pub fn evaluate<G: GridSource + ?Sized>(
    source: &G,
    aoi: &AreaOfInterest,
    convention: PresenceConvention,
    options: &MaskOptions,
) -> Result<bool> {
    let metadata = source.metadata();
    let Some(extent) = aoi.extent() else {
        return Ok(false);
    };
    let Some(window) = PixelWindow::covering(
        &metadata.geotransform,
        &extent,
        metadata.width,
        metadata.height,
    ) else {
        debug!("AOI does not overlap the raster");
        return Ok(false);
    };

    debug!(
        "Masking window ({}, {}) {}x{}",
        window.x_min,
        window.y_min,
        window.width(),
        window.height()
    );

    for strip in window.strips(STRIP_ROWS) {
        let masked = mask(source, aoi, &strip, options)?;
        if masked.shows_presence(convention) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi;
    use crate::crs;
    use crate::io::{RasterGrid, RasterMetadata};
    use tempfile::TempDir;

    // 4x4 grid of 1-degree pixels covering (0, 0)-(4, 4)
    fn grid(data: Array2<f64>, nodata: Option<f64>) -> RasterGrid {
        let metadata = RasterMetadata {
            width: 4,
            height: 4,
            band_count: 1,
            geotransform: [0.0, 1.0, 0.0, 4.0, 0.0, -1.0],
            projection: crs::srs_from_epsg(4326).unwrap().to_wkt().unwrap(),
            nodata,
        };
        RasterGrid::new(vec![data], metadata).unwrap()
    }

    fn area(wkt: &str) -> (TempDir, AreaOfInterest) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("area.geojson");
        aoi::write_polygons(&path, "GeoJSON", Some(4326), &[wkt]).unwrap();
        let area = AreaOfInterest::open(&path).unwrap();
        (dir, area)
    }

    fn top_right(value: f64) -> Array2<f64> {
        let mut data = Array2::zeros((4, 4));
        data[[0, 3]] = value;
        data
    }

    #[test]
    fn test_conventions() {
        assert!(PresenceConvention::AnyPositive.is_present(0.01));
        assert!(!PresenceConvention::AnyPositive.is_present(0.0));
        assert!(!PresenceConvention::AnyPositive.is_present(-1.0));
        assert!(PresenceConvention::ExactMarker(1.0).is_present(1.0));
        assert!(!PresenceConvention::ExactMarker(1.0).is_present(0.7));
        assert!(!PresenceConvention::AnyPositive.is_present(f64::NAN));
    }

    #[test]
    fn test_present_inside_aoi() {
        let source = grid(top_right(1.0), None);
        let (_dir, area) = area("POLYGON ((2.5 2.5, 4 2.5, 4 4, 2.5 4, 2.5 2.5))");
        let opts = MaskOptions::default();
        assert!(evaluate(&source, &area, PresenceConvention::AnyPositive, &opts).unwrap());
        assert!(evaluate(&source, &area, PresenceConvention::ExactMarker(1.0), &opts).unwrap());
    }

    #[test]
    fn test_presence_outside_polygon_is_ignored() {
        let source = grid(top_right(1.0), None);
        let (_dir, area) = area("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))");
        assert!(!evaluate(
            &source,
            &area,
            PresenceConvention::AnyPositive,
            &MaskOptions::default()
        )
        .unwrap());
    }

    #[test]
    fn test_no_overlap_is_absent() {
        let source = grid(Array2::from_elem((4, 4), 1.0), None);
        let (_dir, area) = area("POLYGON ((10 10, 12 10, 12 12, 10 12, 10 10))");
        assert!(!evaluate(
            &source,
            &area,
            PresenceConvention::AnyPositive,
            &MaskOptions::default()
        )
        .unwrap());
    }

    #[test]
    fn test_nodata_never_counts() {
        let source = grid(top_right(255.0), Some(255.0));
        let (_dir, area) = area("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))");
        assert!(!evaluate(
            &source,
            &area,
            PresenceConvention::AnyPositive,
            &MaskOptions::default()
        )
        .unwrap());
        assert!(!evaluate(
            &source,
            &area,
            PresenceConvention::ExactMarker(255.0),
            &MaskOptions::default()
        )
        .unwrap());
    }

    #[test]
    fn test_marker_and_positive_differ() {
        let source = grid(top_right(0.4), None);
        let (_dir, area) = area("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))");
        let opts = MaskOptions::default();
        assert!(evaluate(&source, &area, PresenceConvention::AnyPositive, &opts).unwrap());
        assert!(!evaluate(&source, &area, PresenceConvention::ExactMarker(1.0), &opts).unwrap());
    }

    #[test]
    fn test_all_touched_includes_boundary_pixels() {
        let source = grid(top_right(1.0), None);
        // Inside the top-right pixel but away from its centre (3.5, 3.5)
        let (_dir, area) = area("POLYGON ((3.1 3.1, 3.3 3.1, 3.3 3.3, 3.1 3.3, 3.1 3.1))");

        let centre_only = MaskOptions { all_touched: false };
        let touched = MaskOptions { all_touched: true };
        let convention = PresenceConvention::ExactMarker(1.0);
        assert!(!evaluate(&source, &area, convention, &centre_only).unwrap());
        assert!(evaluate(&source, &area, convention, &touched).unwrap());
    }

    #[test]
    fn test_mask_sets_outside_pixels_to_nodata() {
        let source = grid(Array2::from_elem((4, 4), 1.0), None);
        // Left half of the raster
        let (_dir, area) = area("POLYGON ((0 0, 2 0, 2 4, 0 4, 0 0))");
        let window = PixelWindow::full(4, 4);

        let masked = mask(&source, &area, &window, &MaskOptions::default()).unwrap();
        let band = &masked.bands[0];
        assert_eq!(band[[0, 0]], 1.0);
        assert_eq!(band[[3, 1]], 1.0);
        assert!(band[[0, 2]].is_nan());
        assert!(band[[3, 3]].is_nan());
        assert_eq!(masked.valid_pixels(), 8);
    }
}
