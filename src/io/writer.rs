use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use std::path::Path;

use crate::error::Result;
use crate::raster::{GridRaster, Raster};

/// 地理座標 (WGS84)
const DEFAULT_EPSG: u32 = 4326;

pub struct GeoTiffWriter {
    epsg: u32,
}

impl Default for GeoTiffWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self { epsg: DEFAULT_EPSG }
    }

    pub fn with_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    /// Float64 単バンドの GeoTIFF を書き出す
    pub fn write(&self, raster: &GridRaster, output_path: &Path) -> Result<()> {
        let (cols, rows) = raster.size();

        tracing::info!(
            "Writing raster to GeoTIFF: {} x {} pixels ({:?})",
            cols,
            rows,
            output_path
        );

        // GTiffドライバーを取得
        let driver = DriverManager::get_driver_by_name("GTiff")?;

        let mut dataset = driver.create_with_band_type::<f64, _>(output_path, cols, rows, 1)?;

        // ジオトランスフォームを設定
        dataset.set_geo_transform(&raster.geo_transform().coefficients())?;

        // 座標系を設定
        let srs = SpatialRef::from_epsg(self.epsg)?;
        dataset.set_projection(&srs.to_wkt()?)?;

        let mut band = dataset.rasterband(1)?;

        // NoData値を設定
        if let Some(no_data) = raster.no_data() {
            band.set_no_data_value(Some(no_data))?;
        }

        // データを書き込み（GDALは行優先順を期待）
        let mut buffer = Buffer::new((cols, rows), raster.values().to_vec());
        band.write((0, 0), (cols, rows), &mut buffer)?;

        dataset.set_metadata_item("EPSG", &self.epsg.to_string(), "")?;

        Ok(())
    }
}
