use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::utm::{UtmFrame, UtmPoint, UtmZone};

/// (前後方向, 左右方向) の符号。頂点順は 前右・前左・後左・後右。
const CORNER_SIGNS: [(f64, f64); 4] = [(1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (-1.0, 1.0)];

/// センサーサイズと焦点距離 (mm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorModel {
    pub sensor_width_mm: f64,
    pub sensor_height_mm: f64,
    pub focal_length_mm: f64,
}

impl Default for SensorModel {
    fn default() -> Self {
        Self {
            sensor_width_mm: 35.8,
            sensor_height_mm: 23.9,
            focal_length_mm: 35.0,
        }
    }
}

impl SensorModel {
    pub fn new(sensor_width_mm: f64, sensor_height_mm: f64, focal_length_mm: f64) -> Result<Self> {
        let sensor = Self {
            sensor_width_mm,
            sensor_height_mm,
            focal_length_mm,
        };
        sensor.validate()?;
        Ok(sensor)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sensorWidthMm", self.sensor_width_mm),
            ("sensorHeightMm", self.sensor_height_mm),
            ("focalLengthMm", self.focal_length_mm),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "sensor model {} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// 水平画角 (rad)
    pub fn hfov(&self) -> f64 {
        2.0 * (self.sensor_width_mm / (2.0 * self.focal_length_mm)).atan()
    }

    /// 垂直画角 (rad)
    pub fn vfov(&self) -> f64 {
        2.0 * (self.sensor_height_mm / (2.0 * self.focal_length_mm)).atan()
    }
}

/// カメラ姿勢 (rad)。yaw は北から時計回り。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn from_degrees(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::new(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
    }
}

/// 地上フットプリント。頂点は (lon, lat) で 前右・前左・後左・後右 の順。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootprintPolygon {
    vertices: [(f64, f64); 4],
}

impl FootprintPolygon {
    pub fn vertices(&self) -> &[(f64, f64); 4] {
        &self.vertices
    }

    /// 始点を末尾に繰り返した閉じたリング
    pub fn closed_ring(&self) -> Vec<(f64, f64)> {
        let mut ring = self.vertices.to_vec();
        ring.push(self.vertices[0]);
        ring
    }

    pub fn to_wkt(&self) -> String {
        let coords = self
            .closed_ring()
            .iter()
            .map(|(lon, lat)| format!("{} {}", lon, lat))
            .collect::<Vec<_>>()
            .join(", ");
        format!("POLYGON(({}))", coords)
    }
}

/// カメラの UTM ゾーンにおけるフットプリント
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarFootprint {
    /// カメラ位置 (lat, lon)
    pub origin: (f64, f64),
    pub zone: UtmZone,
    pub center: UtmPoint,
    pub corners: [UtmPoint; 4],
}

impl PlanarFootprint {
    /// 平面上の面積 (m²)。中心からの相対座標で計算する。
    pub fn area(&self) -> f64 {
        let relative = self
            .corners
            .map(|c| (c.easting - self.center.easting, c.northing - self.center.northing));

        let mut twice_area = 0.0;
        for (i, (ax, ay)) in relative.iter().enumerate() {
            let (bx, by) = relative[(i + 1) % relative.len()];
            twice_area += ax * by - bx * ay;
        }
        twice_area.abs() / 2.0
    }

    /// ゾーンをまたぐ場合もカメラのゾーンのまま逆変換する
    pub fn to_geographic(&self) -> Result<FootprintPolygon> {
        let (lat, lon) = self.origin;
        let frame = UtmFrame::with_zone(lat, lon, self.zone)?;
        self.to_geographic_in(&frame)
    }

    fn to_geographic_in(&self, frame: &UtmFrame) -> Result<FootprintPolygon> {
        let mut vertices = [(0.0, 0.0); 4];
        for (vertex, corner) in vertices.iter_mut().zip(self.corners.iter()) {
            let (lat, lon) = frame.inverse(*corner)?;
            *vertex = (lon, lat);
        }
        Ok(FootprintPolygon { vertices })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FootprintProjector {
    sensor: SensorModel,
}

impl FootprintProjector {
    pub fn new(sensor: SensorModel) -> Self {
        Self { sensor }
    }

    pub fn sensor(&self) -> &SensorModel {
        &self.sensor
    }

    pub fn project(
        &self,
        lat: f64,
        lon: f64,
        agl: f64,
        attitude: Attitude,
    ) -> Result<FootprintPolygon> {
        let frame = UtmFrame::at(lat, lon)?;
        self.project_in(&frame, lat, lon, agl, attitude)?
            .to_geographic_in(&frame)
    }

    pub fn project_planar(
        &self,
        lat: f64,
        lon: f64,
        agl: f64,
        attitude: Attitude,
    ) -> Result<PlanarFootprint> {
        let frame = UtmFrame::at(lat, lon)?;
        self.project_in(&frame, lat, lon, agl, attitude)
    }

    fn project_in(
        &self,
        frame: &UtmFrame,
        lat: f64,
        lon: f64,
        agl: f64,
        attitude: Attitude,
    ) -> Result<PlanarFootprint> {
        if !agl.is_finite() || agl <= 0.0 {
            return Err(Error::InvalidAltitude { lat, lon, agl });
        }

        let half_h = self.sensor.hfov() / 2.0;
        let half_v = self.sensor.vfov() / 2.0;

        let zone = frame.zone();
        let center = frame.forward(lat, lon)?;
        let (sin_yaw, cos_yaw) = attitude.yaw.sin_cos();

        let mut corners = [center; 4];
        for (corner, (along, across)) in corners.iter_mut().zip(CORNER_SIGNS) {
            let along_angle = along * half_h + attitude.pitch;
            let across_angle = across * half_v + attitude.roll;
            for angle in [along_angle, across_angle] {
                // NaN もここで弾く
                if !(angle.abs() < FRAC_PI_2) {
                    return Err(Error::DegenerateGeometry { lat, lon, angle });
                }
            }

            let dx = along_angle.tan() * agl;
            let dy = across_angle.tan() * agl;

            // 機体座標 (前方, 右方) -> (東, 北)
            let east = dx * sin_yaw + dy * cos_yaw;
            let north = dx * cos_yaw - dy * sin_yaw;
            *corner = center.offset(east, north);
        }

        debug!(
            "Projected footprint at ({}, {}) agl={} in zone {}",
            lat, lon, agl, zone
        );

        Ok(PlanarFootprint {
            origin: (lat, lon),
            zone,
            center,
            corners,
        })
    }
}

/// `FootprintProjector::new(*sensor).project(...)` の短縮形
pub fn project_footprint(
    lat: f64,
    lon: f64,
    agl: f64,
    attitude: Attitude,
    sensor: &SensorModel,
) -> Result<FootprintPolygon> {
    FootprintProjector::new(*sensor).project(lat, lon, agl, attitude)
}
