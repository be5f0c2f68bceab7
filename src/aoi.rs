use crate::crs;
use crate::error::{PresenceError, Result};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    Defn, Envelope, Feature, FieldDefn, Geometry, Layer, LayerAccess, LayerOptions,
    OGRwkbGeometryType,
};
use gdal::{Dataset, DriverManager};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Polygons defining the study region, with the CRS they are expressed in.
///
/// The geometry set is read once and shared read-only by every raster of a
/// batch.
#[derive(Debug)]
pub struct AreaOfInterest {
    path: PathBuf,
    geometries: Vec<Geometry>,
    srs: Option<SpatialRef>,
}

/// Axis-aligned extent in CRS units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    fn from_envelope(env: &Envelope) -> Self {
        Self {
            min_x: env.MinX,
            min_y: env.MinY,
            max_x: env.MaxX,
            max_y: env.MaxY,
        }
    }

    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

impl AreaOfInterest {
    /// Read every feature geometry of the first layer of a vector dataset.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = open_layer_dataset(path)?;
        let mut layer = dataset
            .layer(0)
            .map_err(|e| PresenceError::invalid_aoi(path, e))?;
        let srs = layer_srs(&layer);

        let mut feature_count = 0usize;
        let mut geometries = Vec::new();
        for feature in layer.features() {
            feature_count += 1;
            match feature.geometry() {
                Some(geometry) if !geometry.is_empty() => geometries.push(geometry.clone()),
                _ => warn!(
                    "Feature {:?} of {} has no geometry, skipping",
                    feature.fid(),
                    path.display()
                ),
            }
        }

        if feature_count == 0 {
            return Err(PresenceError::invalid_aoi(path, "dataset contains no features"));
        }
        if geometries.is_empty() {
            return Err(PresenceError::invalid_aoi(
                path,
                "no feature carries a geometry",
            ));
        }

        debug!(
            "Loaded {} geometries from {} ({})",
            geometries.len(),
            path.display(),
            srs.as_ref()
                .map(crs::describe)
                .unwrap_or_else(|| "no CRS".to_string())
        );

        Ok(Self {
            path: path.to_path_buf(),
            geometries,
            srs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn srs(&self) -> Option<&SpatialRef> {
        self.srs.as_ref()
    }

    /// Assume a CRS for an AOI whose source declared none.
    pub fn with_assumed_srs(mut self, srs: SpatialRef) -> Self {
        if self.srs.is_none() {
            self.srs = Some(srs);
        }
        self
    }

    /// Bounding extent of the union of all geometries
    pub fn extent(&self) -> Option<Extent> {
        self.geometries
            .iter()
            .map(|g| Extent::from_envelope(&g.envelope()))
            .reduce(|acc, e| acc.union(&e))
    }

    /// In-memory copy reprojected to `target`; nothing is written to disk.
    pub fn to_crs(&self, target: &SpatialRef) -> Result<Self> {
        let source = self.srs.as_ref().ok_or_else(|| {
            PresenceError::InvalidCrs(format!(
                "area of interest {} has no CRS to reproject from",
                self.path.display()
            ))
        })?;
        let transform = crs::transform_between(source, target)?;

        let geometries = self
            .geometries
            .iter()
            .map(|g| g.transform(&transform))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            path: self.path.clone(),
            geometries,
            srs: Some(crs::gis_order(target)),
        })
    }
}

/// Open a vector dataset, mapping every failure to [`PresenceError::InvalidAoi`].
pub(crate) fn open_layer_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(PresenceError::invalid_aoi(path, "file does not exist"));
    }
    let dataset = Dataset::open(path).map_err(|e| PresenceError::invalid_aoi(path, e))?;
    if dataset.layer_count() == 0 {
        return Err(PresenceError::invalid_aoi(path, "dataset has no vector layer"));
    }
    Ok(dataset)
}

/// Declared CRS of a layer, in GIS axis order.
pub(crate) fn layer_srs(layer: &Layer) -> Option<SpatialRef> {
    layer.spatial_ref().map(|srs| crs::gis_order(&srs))
}

/// Copy the first layer of `source` to `destination`, reprojecting every
/// geometry and keeping the attribute fields. Returns the number of features
/// written.
pub(crate) fn write_reprojected(
    source: &Dataset,
    destination: &Path,
    source_srs: &SpatialRef,
    target_srs: &SpatialRef,
) -> Result<usize> {
    let mut source_layer = source.layer(0)?;
    let transform = crs::transform_between(source_srs, target_srs)?;

    let fields_defn = source_layer
        .defn()
        .fields()
        .map(|field| (field.name(), field.field_type(), field.width()))
        .collect::<Vec<_>>();
    let geometry_type = source_layer
        .defn()
        .geom_fields()
        .next()
        .map(|field| field.field_type())
        .unwrap_or(OGRwkbGeometryType::wkbUnknown);

    if let Some(dir) = destination.parent() {
        fs::create_dir_all(dir)?;
    }

    let driver = source.driver();
    if destination.exists() {
        debug!("Replacing earlier copy at {}", destination.display());
        driver.delete(destination)?;
    }

    let layer_name = destination
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("aoi");

    let mut dataset = driver.create_vector_only(destination)?;
    let layer = dataset.create_layer(LayerOptions {
        name: layer_name,
        srs: Some(target_srs),
        ty: geometry_type,
        ..Default::default()
    })?;

    for (name, field_type, width) in &fields_defn {
        let field_defn = FieldDefn::new(name, *field_type)?;
        field_defn.set_width(*width);
        field_defn.add_to_layer(&layer)?;
    }

    let defn = Defn::from_layer(&layer);
    let mut written = 0usize;
    for source_feature in source_layer.features() {
        let mut feature = Feature::new(&defn)?;
        if let Some(geometry) = source_feature.geometry() {
            feature.set_geometry(geometry.transform(&transform)?)?;
        }
        for (name, _, _) in &fields_defn {
            if let Some(value) = source_feature.field(name)? {
                feature.set_field(name, &value)?;
            }
        }
        feature.create(&layer)?;
        written += 1;
    }

    info!(
        "Reprojected AOI written with driver {}",
        driver.short_name()
    );
    Ok(written)
}

/// Create a vector dataset holding `wkt_polygons` in the given CRS.
///
/// Used to build fixtures; `epsg = None` writes a layer without CRS.
pub fn write_polygons(
    path: &Path,
    driver_name: &str,
    epsg: Option<u32>,
    wkt_polygons: &[&str],
) -> Result<()> {
    let driver = DriverManager::get_driver_by_name(driver_name)?;
    let srs = epsg.map(crs::srs_from_epsg).transpose()?;
    let mut dataset = driver.create_vector_only(path)?;
    let mut layer = dataset.create_layer(LayerOptions {
        name: path.file_stem().and_then(|s| s.to_str()).unwrap_or("aoi"),
        srs: srs.as_ref(),
        ty: OGRwkbGeometryType::wkbPolygon,
        ..Default::default()
    })?;
    for wkt in wkt_polygons {
        layer.create_feature(Geometry::from_wkt(wkt)?)?;
    }
    Ok(())
}
