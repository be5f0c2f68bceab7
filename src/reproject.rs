use crate::crs;
use crate::error::{PresenceError, Result};
use crate::io::{GridSource, RasterGrid, RasterMetadata};
use crate::window::{apply, invert};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::GeoTransform;
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

/// Points sampled along each raster edge when estimating the output grid
const EDGE_SAMPLES: usize = 21;

/// Largest warp output accepted, in pixels per band
pub const MAX_WARP_PIXELS: usize = 1 << 28;

/// Shape and georeferencing of a reprojected raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpGrid {
    pub geotransform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

/// Estimate the output grid of a warp, the way GDAL's suggested warp output
/// does it.
///
/// The raster edges are sampled and transformed to get the target extent. The
/// square pixel size keeps the same number of pixels along the diagonal as the
/// source, and the extent is then snapped to a whole number of pixels.
pub fn suggested_warp_output(
    metadata: &RasterMetadata,
    transform: &CoordTransform,
) -> Result<WarpGrid> {
    let (w, h) = (metadata.width as f64, metadata.height as f64);

    let mut pixels = Vec::with_capacity(EDGE_SAMPLES * 4);
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
        pixels.push((t * w, 0.0));
        pixels.push((t * w, h));
        pixels.push((0.0, t * h));
        pixels.push((w, t * h));
    }

    let mut projected = project_pixels(&metadata.geotransform, &pixels, transform);
    if projected.len() < pixels.len() {
        // Some edge points fall outside the target domain; look inside too
        debug!(
            "{} of {} edge samples failed, sampling the interior",
            pixels.len() - projected.len(),
            pixels.len()
        );
        let interior: Vec<(f64, f64)> = (0..EDGE_SAMPLES)
            .flat_map(|i| (0..EDGE_SAMPLES).map(move |j| (i, j)))
            .map(|(i, j)| {
                let step = (EDGE_SAMPLES - 1) as f64;
                (i as f64 / step * w, j as f64 / step * h)
            })
            .collect();
        projected.extend(project_pixels(&metadata.geotransform, &interior, transform));
    }

    if projected.is_empty() {
        return Err(PresenceError::Reprojection(
            "no part of the raster can be expressed in the target CRS".to_string(),
        ));
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in &projected {
        min_x = min_x.min(*x);
        max_x = max_x.max(*x);
        min_y = min_y.min(*y);
        max_y = max_y.max(*y);
    }

    let diagonal = (max_x - min_x).hypot(max_y - min_y);
    let pixel_diagonal = w.hypot(h);
    let pixel_size = diagonal / pixel_diagonal;
    if !(pixel_size.is_finite() && pixel_size > 0.0) {
        return Err(PresenceError::Reprojection(format!(
            "degenerate target extent ({}, {})-({}, {})",
            min_x, min_y, max_x, max_y
        )));
    }

    let width = (((max_x - min_x) / pixel_size) + 0.5).max(1.0);
    let height = (((max_y - min_y) / pixel_size) + 0.5).max(1.0);
    if width * height > MAX_WARP_PIXELS as f64 {
        return Err(PresenceError::Reprojection(format!(
            "warp output of {:.0}x{:.0} pixels exceeds the limit of {}",
            width, height, MAX_WARP_PIXELS
        )));
    }
    let (width, height) = (width as usize, height as usize);

    Ok(WarpGrid {
        geotransform: [min_x, pixel_size, 0.0, max_y, 0.0, -pixel_size],
        width,
        height,
    })
}

/// Reproject every band of `source` into `target` with nearest-neighbour
/// resampling.
///
/// Destination pixels with no source pixel behind them take the source's
/// nodata value, or 0 when it has none.
pub fn reproject<G: GridSource + ?Sized>(source: &G, target: &SpatialRef) -> Result<RasterGrid> {
    let metadata = source.metadata();
    let source_srs = metadata.srs()?;

    let forward = crs::transform_between(&source_srs, target)?;
    let grid = suggested_warp_output(metadata, &forward)?;
    info!(
        "Warping {}x{} raster from {} to {}: {}x{} pixels of {:.6}",
        metadata.width,
        metadata.height,
        crs::describe(&source_srs),
        crs::describe(target),
        grid.width,
        grid.height,
        grid.geotransform[1]
    );

    let inverse = crs::transform_between(target, &source_srs)?;
    let lookup = source_lookup(metadata, &grid, &inverse)?;
    let fill = metadata.nodata.unwrap_or(0.0);

    let mut bands = Vec::with_capacity(metadata.band_count);
    for band_index in 1..=metadata.band_count {
        let values = source.read_window(band_index, &metadata.full_window())?;
        bands.push(gather(&values, &lookup, &grid, fill)?);
    }

    let warped = RasterMetadata {
        width: grid.width,
        height: grid.height,
        band_count: bands.len(),
        geotransform: grid.geotransform,
        projection: target.to_wkt()?,
        nodata: metadata.nodata,
    };
    RasterGrid::new(bands, warped)
}

/// For every destination pixel, the source pixel nearest to its centre.
fn source_lookup(
    metadata: &RasterMetadata,
    grid: &WarpGrid,
    inverse: &CoordTransform,
) -> Result<Vec<Option<(usize, usize)>>> {
    let source_inverse = invert(&metadata.geotransform).ok_or_else(|| {
        PresenceError::Reprojection("source geotransform is not invertible".to_string())
    })?;

    let mut lookup = Vec::with_capacity(grid.width * grid.height);
    for row in 0..grid.height {
        let (xs, ys): (Vec<f64>, Vec<f64>) = (0..grid.width)
            .map(|col| apply(&grid.geotransform, col as f64 + 0.5, row as f64 + 0.5))
            .unzip();

        for point in transform_points(inverse, &xs, &ys) {
            lookup.push(point.and_then(|(x, y)| {
                let (col, line) = apply(&source_inverse, x, y);
                let (col, line) = (col.floor(), line.floor());
                if col >= 0.0
                    && line >= 0.0
                    && col < metadata.width as f64
                    && line < metadata.height as f64
                {
                    Some((line as usize, col as usize))
                } else {
                    None
                }
            }));
        }
    }
    Ok(lookup)
}

fn gather(
    values: &Array2<f64>,
    lookup: &[Option<(usize, usize)>],
    grid: &WarpGrid,
    fill: f64,
) -> Result<Array2<f64>> {
    let rows: Vec<Vec<f64>> = lookup
        .par_chunks(grid.width)
        .map(|row| {
            row.iter()
                .map(|cell| cell.map_or(fill, |index| values[index]))
                .collect()
        })
        .collect();

    let data: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((grid.height, grid.width), data)?)
}

/// Map pixel coordinates to target CRS coordinates, dropping points that
/// cannot be transformed.
fn project_pixels(
    geotransform: &GeoTransform,
    pixels: &[(f64, f64)],
    transform: &CoordTransform,
) -> Vec<(f64, f64)> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = pixels
        .iter()
        .map(|&(px, line)| apply(geotransform, px, line))
        .unzip();
    transform_points(transform, &xs, &ys)
        .into_iter()
        .flatten()
        .collect()
}

/// Transform a batch of points; points GDAL cannot transform become `None`.
fn transform_points(
    transform: &CoordTransform,
    xs: &[f64],
    ys: &[f64],
) -> Vec<Option<(f64, f64)>> {
    let finite = |x: f64, y: f64| (x.is_finite() && y.is_finite()).then_some((x, y));

    let mut tx = xs.to_vec();
    let mut ty = ys.to_vec();
    if transform.transform_coords(&mut tx, &mut ty, &mut []).is_ok() {
        return tx.into_iter().zip(ty).map(|(x, y)| finite(x, y)).collect();
    }

    // GDAL fails the whole call if one point fails; retry point by point
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let mut px = [x];
            let mut py = [y];
            transform
                .transform_coords(&mut px, &mut py, &mut [])
                .ok()
                .and_then(|_| finite(px[0], py[0]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(
        epsg: u32,
        geotransform: GeoTransform,
        data: Array2<f64>,
        nodata: Option<f64>,
    ) -> RasterGrid {
        let (height, width) = data.dim();
        let metadata = RasterMetadata {
            width,
            height,
            band_count: 1,
            geotransform,
            projection: crs::srs_from_epsg(epsg).unwrap().to_wkt().unwrap(),
            nodata,
        };
        RasterGrid::new(vec![data], metadata).unwrap()
    }

    #[test]
    fn test_suggested_output_identity() {
        let source = grid(4326, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0], Array2::zeros((10, 10)), None);
        let wgs84 = crs::srs_from_epsg(4326).unwrap();
        let transform = crs::transform_between(&wgs84, &wgs84).unwrap();

        let out = suggested_warp_output(source.metadata(), &transform).unwrap();
        assert_eq!((out.width, out.height), (10, 10));
        assert!((out.geotransform[0] - 0.0).abs() < 1e-9);
        assert!((out.geotransform[1] - 1.0).abs() < 1e-9);
        assert!((out.geotransform[3] - 10.0).abs() < 1e-9);
        assert!((out.geotransform[5] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_oversized_warp_output_is_rejected() {
        // Metadata only: the estimate never reads pixel values
        let source = grid(4326, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0], Array2::zeros((1, 1)), None);
        let mut metadata = source.metadata().clone();
        metadata.width = 1 << 15;
        metadata.height = 1 << 15;
        let wgs84 = crs::srs_from_epsg(4326).unwrap();
        let transform = crs::transform_between(&wgs84, &wgs84).unwrap();

        assert!(matches!(
            suggested_warp_output(&metadata, &transform).unwrap_err(),
            PresenceError::Reprojection(_)
        ));
    }

    #[test]
    fn test_reproject_utm_to_wgs84_keeps_values() {
        // 20x20 pixels of 100 m around the UTM 18N central meridian
        let mut data = Array2::zeros((20, 20));
        data[[0, 0]] = -9999.0;
        for row in 5..15 {
            for col in 5..15 {
                data[[row, col]] = 1.0;
            }
        }
        let source = grid(
            32618,
            [499_000.0, 100.0, 0.0, 1_001_000.0, 0.0, -100.0],
            data,
            Some(-9999.0),
        );
        let wgs84 = crs::srs_from_epsg(4326).unwrap();

        let warped = reproject(&source, &wgs84).unwrap();
        let meta = warped.metadata();
        assert!(crs::is_canonical(&meta.srs().unwrap(), 4326));
        assert_eq!(meta.nodata, Some(-9999.0));
        assert!((meta.geotransform[0] + 75.009).abs() < 0.01);
        assert!(meta.width > 0 && meta.height > 0);

        let band = &warped.bands()[0];
        assert!(band.iter().any(|&v| v == 1.0));
        assert!(band.iter().all(|&v| v == 0.0 || v == 1.0 || v == -9999.0));
    }

    #[test]
    fn test_reproject_without_crs_fails() {
        let mut source = grid(4326, [0.0, 1.0, 0.0, 2.0, 0.0, -1.0], Array2::zeros((2, 2)), None);
        source = RasterGrid::new(
            source.bands().to_vec(),
            RasterMetadata {
                projection: String::new(),
                ..source.metadata().clone()
            },
        )
        .unwrap();
        let wgs84 = crs::srs_from_epsg(4326).unwrap();
        assert!(matches!(
            reproject(&source, &wgs84).unwrap_err(),
            PresenceError::InvalidCrs(_)
        ));
    }
}
