mod clough_tocher;

pub use clough_tocher::{MeshError, Triangulation};

use nalgebra::Point2;
use tracing::trace;

use crate::error::{Error, Result};
use crate::raster::Raster;

const WINDOW: usize = 3;
const KNOTS: usize = WINDOW * WINDOW;

/// ラスタ上の任意の地理座標における値を 3x3 近傍から補間する。
///
/// ジオイド高・地形標高のどちらのラスタにも同じアルゴリズムを使う。
#[derive(Debug, Clone, Copy)]
pub struct RasterSampler<'a, R: Raster + ?Sized> {
    raster: &'a R,
}

impl<'a, R: Raster + ?Sized> RasterSampler<'a, R> {
    pub fn new(raster: &'a R) -> Self {
        Self { raster }
    }

    pub fn raster(&self) -> &'a R {
        self.raster
    }

    pub fn sample(&self, lat: f64, lon: f64) -> Result<f64> {
        sample(self.raster, lat, lon)
    }
}

/// `(lat, lon)` の補間値を返す。
///
/// 1. 地理座標を小数のグリッド座標に変換する
/// 2. `(floor(column) - 1, floor(row) - 1)` を左上とする 3x3 窓を読む
/// 3. 各セルの地理座標を geotransform から計算する
/// 4. 9点の三角形分割上で Clough-Tocher 三次補間し、問い合わせ点で評価する
///
/// 近傍がラスタ範囲外なら [`Error::OutOfBounds`]、窓に NoData / 非有限値が
/// 含まれるか三角形分割が退化していれば [`Error::Interpolation`]。
pub fn sample<R: Raster + ?Sized>(raster: &R, lat: f64, lon: f64) -> Result<f64> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(Error::OutOfBounds { lat, lon });
    }

    let transform = *raster.geo_transform();
    let (column, row) = transform.geo_to_pixel(lon, lat);
    let (center_col, center_row) = (column.floor(), row.floor());

    // 整数に変換する前に f64 のまま範囲を確かめる
    let (cols, rows) = raster.size();
    let inside = |center: f64, len: usize| center >= 1.0 && center + 2.0 <= len as f64;
    if !(inside(center_col, cols) && inside(center_row, rows)) {
        return Err(Error::OutOfBounds { lat, lon });
    }

    let x = center_col as isize - 1;
    let y = center_row as isize - 1;
    let window = raster.read_window(x, y, WINDOW, WINDOW)?;
    if window.len() != KNOTS {
        return Err(Error::InvalidRaster(format!(
            "expected {} samples from 3x3 window, got {}",
            KNOTS,
            window.len()
        )));
    }

    let no_data = raster.no_data();
    if let Some(bad) = window.iter().find(|&&v| is_no_data(v, no_data)) {
        return Err(Error::Interpolation {
            lat,
            lon,
            reason: format!("3x3 window contains no-data sample {}", bad),
        });
    }

    // 中心セルを原点とするラスタ単位の座標
    let (center_lon, center_lat) = transform.pixel_to_geo(center_col, center_row);
    let knots = (0..KNOTS)
        .map(|i| {
            let (node_lon, node_lat) = transform.pixel_to_geo(
                center_col + (i % WINDOW) as f64 - 1.0,
                center_row + (i / WINDOW) as f64 - 1.0,
            );
            Point2::new(node_lon - center_lon, node_lat - center_lat)
        })
        .collect();

    let interpolation_error = |e: MeshError| Error::Interpolation {
        lat,
        lon,
        reason: e.to_string(),
    };
    let mesh = Triangulation::regular_grid(knots, WINDOW, WINDOW).map_err(interpolation_error)?;
    let value = mesh
        .interpolate(&window, Point2::new(lon - center_lon, lat - center_lat))
        .map_err(interpolation_error)?;

    if !value.is_finite() {
        return Err(Error::Interpolation {
            lat,
            lon,
            reason: format!("interpolated value {} is not finite", value),
        });
    }

    trace!(
        "Sampled ({}, {}) at pixel ({:.3}, {:.3}): {}",
        lat, lon, column, row, value
    );
    Ok(value)
}

fn is_no_data(value: f64, no_data: Option<f64>) -> bool {
    if !value.is_finite() {
        return true;
    }
    matches!(no_data, Some(nd) if nd == value)
}
