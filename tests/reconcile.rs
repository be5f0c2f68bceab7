mod common;

use common::WHOLE_RASTER;
use species_presence::aoi::write_polygons;
use species_presence::{crs, reconcile_aoi, AreaOfInterest, CrsConfig, PresenceError};

#[test]
fn test_canonical_aoi_is_returned_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("area.geojson");
    write_polygons(&path, "GeoJSON", Some(4326), &[WHOLE_RASTER]).unwrap();

    let reconciled = reconcile_aoi(&path, &CrsConfig::default()).unwrap();
    assert_eq!(reconciled, path);
    assert!(!dir.path().join(crs::RECONCILED_DIR).exists());
}

#[test]
fn test_non_canonical_aoi_gets_canonical_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("area.shp");
    write_polygons(
        &path,
        "ESRI Shapefile",
        Some(3857),
        &[
            "POLYGON ((0 0, 100000 0, 100000 100000, 0 100000, 0 0))",
            "POLYGON ((200000 200000, 300000 200000, 300000 300000, 200000 300000, 200000 200000))",
        ],
    )
    .unwrap();

    let reconciled = reconcile_aoi(&path, &CrsConfig::default()).unwrap();
    assert_eq!(
        reconciled,
        dir.path().join(crs::RECONCILED_DIR).join("area.shp")
    );

    let copy = AreaOfInterest::open(&reconciled).unwrap();
    assert_eq!(copy.len(), 2);
    assert!(crs::is_canonical(copy.srs().unwrap(), 4326));
    let extent = copy.extent().unwrap();
    assert!(extent.max_x < 3.0 && extent.max_x > 2.0);

    // The source is left alone
    let original = AreaOfInterest::open(&path).unwrap();
    assert!(!crs::is_canonical(original.srs().unwrap(), 4326));

    // Reconciling again replaces the earlier copy
    let again = reconcile_aoi(&path, &CrsConfig::default()).unwrap();
    assert_eq!(again, reconciled);
    assert_eq!(AreaOfInterest::open(&again).unwrap().len(), 2);
}

#[test]
fn test_aoi_without_crs_needs_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nocrs.shp");
    write_polygons(&path, "ESRI Shapefile", None, &[WHOLE_RASTER]).unwrap();

    assert!(matches!(
        reconcile_aoi(&path, &CrsConfig::default()).unwrap_err(),
        PresenceError::InvalidCrs(_)
    ));

    let config = CrsConfig {
        fallback_aoi_epsg: Some(4326),
        ..CrsConfig::default()
    };
    assert_eq!(reconcile_aoi(&path, &config).unwrap(), path);
}

#[test]
fn test_missing_aoi_is_invalid_aoi() {
    let dir = tempfile::tempdir().unwrap();
    let err = reconcile_aoi(&dir.path().join("missing.shp"), &CrsConfig::default()).unwrap_err();
    assert!(matches!(err, PresenceError::InvalidAoi { .. }));
    assert!(err.is_batch_fatal());
}

#[test]
fn test_empty_aoi_is_invalid_aoi() {
    let dir = tempfile::tempdir().unwrap();

    let canonical = dir.path().join("empty.geojson");
    write_polygons(&canonical, "GeoJSON", Some(4326), &[]).unwrap();
    let err = reconcile_aoi(&canonical, &CrsConfig::default()).unwrap_err();
    assert!(matches!(err, PresenceError::InvalidAoi { .. }));

    let mercator = dir.path().join("empty.shp");
    write_polygons(&mercator, "ESRI Shapefile", Some(3857), &[]).unwrap();
    let err = reconcile_aoi(&mercator, &CrsConfig::default()).unwrap_err();
    assert!(matches!(err, PresenceError::InvalidAoi { .. }));
    assert!(err.is_batch_fatal());

    // Rejected before any copy is written
    assert!(!dir.path().join(crs::RECONCILED_DIR).exists());
}
