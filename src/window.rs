use crate::aoi::Extent;
use gdal::GeoTransform;
use log::debug;

/// Rectangular block of pixels, half-open on the max side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

impl PixelWindow {
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x_min: 0,
            y_min: 0,
            x_max: width,
            y_max: height,
        }
    }

    pub fn width(&self) -> usize {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> usize {
        self.y_max - self.y_min
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Pixel window covering `extent` on a raster of `width` x `height`.
    ///
    /// The window is rounded outward (floor of the minimum, ceiling of the
    /// maximum pixel coordinate) and clamped to the raster. Returns `None`
    /// when the extent does not overlap the raster.
    pub fn covering(
        geotransform: &GeoTransform,
        extent: &Extent,
        width: usize,
        height: usize,
    ) -> Option<Self> {
        let inverse = invert(geotransform)?;

        let corners = [
            (extent.min_x, extent.min_y),
            (extent.min_x, extent.max_y),
            (extent.max_x, extent.min_y),
            (extent.max_x, extent.max_y),
        ];
        let mut col_min = f64::INFINITY;
        let mut col_max = f64::NEG_INFINITY;
        let mut row_min = f64::INFINITY;
        let mut row_max = f64::NEG_INFINITY;
        for (x, y) in corners {
            let (col, row) = apply(&inverse, x, y);
            col_min = col_min.min(col);
            col_max = col_max.max(col);
            row_min = row_min.min(row);
            row_max = row_max.max(row);
        }

        if !(col_min.is_finite() && col_max.is_finite() && row_min.is_finite() && row_max.is_finite())
        {
            return None;
        }

        let x_min = col_min.floor().max(0.0);
        let y_min = row_min.floor().max(0.0);
        let x_max = col_max.ceil().min(width as f64);
        let y_max = row_max.ceil().min(height as f64);

        if x_min >= x_max || y_min >= y_max {
            debug!(
                "Extent ({:.6}, {:.6})-({:.6}, {:.6}) falls outside the {}x{} raster",
                extent.min_x, extent.min_y, extent.max_x, extent.max_y, width, height
            );
            return None;
        }

        Some(Self {
            x_min: x_min as usize,
            y_min: y_min as usize,
            x_max: x_max as usize,
            y_max: y_max as usize,
        })
    }

    /// Geotransform of this window's top-left pixel within `geotransform`
    pub fn geotransform(&self, geotransform: &GeoTransform) -> GeoTransform {
        let (x, y) = apply(geotransform, self.x_min as f64, self.y_min as f64);
        [
            x,
            geotransform[1],
            geotransform[2],
            y,
            geotransform[4],
            geotransform[5],
        ]
    }

    /// Split into horizontal strips of at most `max_rows` rows.
    pub fn strips(&self, max_rows: usize) -> StripIterator {
        StripIterator {
            window: *self,
            max_rows: max_rows.max(1),
            next_row: self.y_min,
        }
    }
}

pub struct StripIterator {
    window: PixelWindow,
    max_rows: usize,
    next_row: usize,
}

impl Iterator for StripIterator {
    type Item = PixelWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_row >= self.window.y_max || self.window.width() == 0 {
            return None;
        }
        let y_min = self.next_row;
        let y_max = (y_min + self.max_rows).min(self.window.y_max);
        self.next_row = y_max;
        Some(PixelWindow {
            x_min: self.window.x_min,
            y_min,
            x_max: self.window.x_max,
            y_max,
        })
    }
}

/// Map pixel/line coordinates to georeferenced ones
pub fn apply(gt: &GeoTransform, pixel: f64, line: f64) -> (f64, f64) {
    (
        gt[0] + pixel * gt[1] + line * gt[2],
        gt[3] + pixel * gt[4] + line * gt[5],
    )
}

/// Inverse of an affine geotransform, `None` when it is degenerate
pub fn invert(gt: &GeoTransform) -> Option<GeoTransform> {
    let det = gt[1] * gt[5] - gt[2] * gt[4];
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    let a = gt[5] * inv_det;
    let b = -gt[2] * inv_det;
    let d = -gt[4] * inv_det;
    let e = gt[1] * inv_det;
    Some([
        -(gt[0] * a + gt[3] * b),
        a,
        b,
        -(gt[0] * d + gt[3] * e),
        d,
        e,
    ])
}
