pub mod altitude;
pub mod config;
pub mod error;
pub mod footprint;
#[cfg(feature = "gdal")]
pub mod io;
pub mod raster;
pub mod sampler;
pub mod utm;

pub use altitude::{AglConverter, AglPoint, BatchReport, BoundingBox, CapturePoint, GeoPoint};
pub use config::AglConfig;
pub use error::{Error, Result};
pub use footprint::{Attitude, FootprintPolygon, FootprintProjector, SensorModel};
pub use raster::{GeoTransform, GridRaster, Raster};
pub use sampler::{sample, RasterSampler};
