use agl_core::altitude::{AglConverter, CapturePoint, GeoPoint};
use agl_core::footprint::{Attitude, FootprintProjector, SensorModel};
use agl_core::raster::{GeoTransform, GridRaster};
use agl_core::{sample, Error};

fn flat_terrain() -> GridRaster {
    // lat 47.0-47.1, lon 8.0-8.1 を 0.0001度間隔で覆う平坦な地形
    let transform = GeoTransform::new(8.0, 0.0001, 47.1, -0.0001).unwrap();
    GridRaster::filled(transform, 1000, 1000, 100.0).unwrap()
}

#[test]
fn test_flat_terrain_agl() {
    let terrain = flat_terrain();
    let converter = AglConverter::new(&terrain);

    let capture = CapturePoint::new(GeoPoint::new(47.05, 8.05, 250.0));
    let result = converter.convert(0, &capture).unwrap();

    assert!((result.terrain_elevation - 100.0).abs() < 0.01);
    assert!((result.agl - 150.0).abs() < 0.01);
}

#[test]
fn test_nadir_footprint_extents() {
    let sensor = SensorModel::new(35.8, 23.9, 35.0).unwrap();
    let footprint = FootprintProjector::new(sensor)
        .project_planar(47.05, 8.05, 150.0, Attitude::default())
        .unwrap();

    let half_along = 150.0 * (35.8f64 / 70.0).atan().tan();
    let half_across = 150.0 * (23.9f64 / 70.0).atan().tan();

    let [fr, fl, bl, br] = footprint.corners;
    let center = footprint.center;

    // 前右の角
    assert!((fr.northing - center.northing - half_along).abs() < 1e-6);
    assert!((fr.easting - center.easting - half_across).abs() < 1e-6);

    // 各辺の長さ
    assert!(((fr.easting - fl.easting) - 2.0 * half_across).abs() < 1e-6);
    assert!(((fl.northing - bl.northing) - 2.0 * half_along).abs() < 1e-6);
    assert!(((br.easting - bl.easting) - 2.0 * half_across).abs() < 1e-6);

    assert!((half_along - 76.714).abs() < 0.01);
    assert!((half_across - 51.214).abs() < 0.01);
}

#[test]
fn test_full_pipeline_with_geoid_and_footprint() {
    let terrain = flat_terrain();
    let geoid = GridRaster::filled(
        GeoTransform::new(7.0, 0.5, 48.0, -0.5).unwrap(),
        6,
        6,
        48.2,
    )
    .unwrap();

    let captures: Vec<_> = (0..50)
        .map(|i| {
            let lat = 47.01 + i as f64 * 0.0015;
            let lon = 8.02 + i as f64 * 0.001;
            CapturePoint::new(GeoPoint::new(lat, lon, 298.2))
                .with_attitude(Attitude::from_degrees(1.0, -2.0, i as f64 * 7.0))
        })
        .collect();

    let report = AglConverter::new(&terrain)
        .with_geoid(&geoid)
        .with_footprint(SensorModel::default())
        .convert_all(&captures);

    assert!(report.is_complete());
    assert_eq!(report.converted.len(), 50);
    for (i, point) in report.converted.iter().enumerate() {
        assert_eq!(point.index, i);
        assert!((point.agl - 150.0).abs() < 0.01);

        let polygon = point.footprint.unwrap();
        for (lon, lat) in polygon.vertices() {
            // 150m の高さなら各頂点は撮影点から 0.002度以内
            assert!((lat - point.point.lat).abs() < 0.002);
            assert!((lon - point.point.lon).abs() < 0.002);
        }
    }
}

#[test]
fn test_point_outside_terrain_is_out_of_bounds() {
    let terrain = flat_terrain();
    assert!(matches!(
        sample(&terrain, 47.2, 8.05),
        Err(Error::OutOfBounds { .. })
    ));
    assert!(matches!(
        sample(&terrain, 47.05, 8.00005),
        Err(Error::OutOfBounds { .. })
    ));
}
