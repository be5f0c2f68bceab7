#![allow(dead_code)]

use ndarray::Array2;
use species_presence::{crs, io, RasterGrid, RasterMetadata};
use std::path::Path;

/// 1-degree pixels in WGS84 with the top-left corner at (0, 4)
pub const WGS84_GT: [f64; 6] = [0.0, 1.0, 0.0, 4.0, 0.0, -1.0];

pub fn write_raster(
    path: &Path,
    epsg: u32,
    geotransform: [f64; 6],
    data: Array2<f64>,
    nodata: Option<f64>,
) {
    let (height, width) = data.dim();
    let metadata = RasterMetadata {
        width,
        height,
        band_count: 1,
        geotransform,
        projection: crs::srs_from_epsg(epsg).unwrap().to_wkt().unwrap(),
        nodata,
    };
    let grid = RasterGrid::new(vec![data], metadata).unwrap();
    io::write_geotiff(path, &grid).unwrap();
}

/// 4x4 WGS84 raster, all zero except `value` in the top-right pixel
/// (x 3..4, y 3..4)
pub fn write_top_right(path: &Path, value: f64) {
    let mut data = Array2::zeros((4, 4));
    data[[0, 3]] = value;
    write_raster(path, 4326, WGS84_GT, data, Some(-9999.0));
}

pub const WHOLE_RASTER: &str = "POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))";
pub const FAR_AWAY: &str = "POLYGON ((20 20, 22 20, 22 22, 20 22, 20 20))";
