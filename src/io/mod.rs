//! GDAL を使った GeoTIFF の読み書き (`gdal` feature)。
//!
//! コアの補間・投影はファイルを扱わない。ここで読み込んだ [`GridRaster`] を
//! 値として渡す。

mod writer;

pub use writer::GeoTiffWriter;

use gdal::Dataset;
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, GridRaster};

/// ラスタのバンド1をメモリに読み込む
pub fn read_raster(path: &Path) -> Result<GridRaster> {
    let dataset = Dataset::open(path)?;

    let transform = GeoTransform::from_coefficients(dataset.geo_transform()?)?;
    let (cols, rows) = dataset.raster_size();
    if dataset.raster_count() < 1 {
        return Err(Error::InvalidRaster(format!(
            "{:?} has no raster bands",
            path
        )));
    }

    let band = dataset.rasterband(1)?;
    let no_data = band.no_data_value();

    // データを読み込み（行優先）
    let buffer = band.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
    let values = buffer.data().to_vec();

    info!(
        "Loaded raster {:?}: {} x {} pixels, nodata={:?}",
        path, cols, rows, no_data
    );

    GridRaster::new(transform, cols, rows, values, no_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Raster;
    use crate::sampler::sample;
    use gdal::DriverManager;
    use tempfile::TempDir;

    fn gtiff_available() -> bool {
        DriverManager::get_driver_by_name("GTiff").is_ok()
    }

    #[test]
    fn test_read_back_written_raster() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("terrain.tif");

        let transform = GeoTransform::new(8.0, 0.001, 47.1, -0.001).unwrap();
        let raster = GridRaster::from_fn(transform, 20, 10, |c, r| 100.0 + c as f64 + r as f64)
            .unwrap()
            .with_no_data(Some(-9999.0));
        GeoTiffWriter::new().write(&raster, &path).unwrap();

        let loaded = read_raster(&path).unwrap();
        assert_eq!(loaded.size(), (20, 10));
        assert_eq!(loaded.geo_transform(), raster.geo_transform());
        assert_eq!(loaded.no_data(), Some(-9999.0));
        assert_eq!(loaded.values(), raster.values());

        let value = sample(&loaded, 47.0955, 8.0105).unwrap();
        assert!((value - (100.0 + 10.5 + 4.5)).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_raster(&temp_dir.path().join("missing.tif")).is_err());
    }
}
