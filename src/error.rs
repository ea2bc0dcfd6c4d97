use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// 3x3近傍がラスタ範囲外
    #[error("3x3 neighbourhood of ({lat}, {lon}) lies outside the raster extent")]
    OutOfBounds { lat: f64, lon: f64 },

    #[error("interpolation failed at ({lat}, {lon}): {reason}")]
    Interpolation { lat: f64, lon: f64, reason: String },

    #[error("invalid AGL {agl} at ({lat}, {lon}): must be positive and finite")]
    InvalidAltitude { lat: f64, lon: f64, agl: f64 },

    #[error("degenerate footprint geometry at ({lat}, {lon}): corner angle {angle} rad reaches ±90°")]
    DegenerateGeometry { lat: f64, lon: f64, angle: f64 },

    #[error("projection failed at ({lat}, {lon}): {reason}")]
    Projection { lat: f64, lon: f64, reason: String },

    #[error("invalid geotransform: {0}")]
    InvalidGeoTransform(String),

    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl Error {
    /// エラーに紐づく座標 (lat, lon)
    pub fn coordinate(&self) -> Option<(f64, f64)> {
        match *self {
            Error::OutOfBounds { lat, lon }
            | Error::Interpolation { lat, lon, .. }
            | Error::InvalidAltitude { lat, lon, .. }
            | Error::DegenerateGeometry { lat, lon, .. }
            | Error::Projection { lat, lon, .. } => Some((lat, lon)),
            _ => None,
        }
    }
}
