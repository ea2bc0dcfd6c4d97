//! 楕円体高 -> 正標高 -> 対地高度 (AGL) の変換と、その一括処理。

use rayon::prelude::*;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::footprint::{Attitude, FootprintPolygon, FootprintProjector, SensorModel};
use crate::raster::Raster;
use crate::sampler::sample;

/// 緯度・経度・高さ。高さの基準 (楕円体/ジオイド/地表) は呼び出し側が管理する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub height: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64, height: f64) -> Self {
        Self { lat, lon, height }
    }
}

/// 撮影点。姿勢はフットプリント計算時のみ使う。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePoint {
    pub position: GeoPoint,
    pub attitude: Option<Attitude>,
}

impl CapturePoint {
    pub fn new(position: GeoPoint) -> Self {
        Self {
            position,
            attitude: None,
        }
    }

    pub fn with_attitude(mut self, attitude: Attitude) -> Self {
        self.attitude = Some(attitude);
        self
    }
}

/// DEM 取得範囲 (度)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// 点群の外接矩形に `margin` 度の余白を付ける。空なら `None`。
    pub fn around<'a, I>(points: I, margin: f64) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let init = Self {
            south: first.lat,
            north: first.lat,
            west: first.lon,
            east: first.lon,
        };

        let bbox = iter.fold(init, |b, p| Self {
            south: b.south.min(p.lat),
            north: b.north.max(p.lat),
            west: b.west.min(p.lon),
            east: b.east.max(p.lon),
        });

        Some(Self {
            south: bbox.south - margin,
            north: bbox.north + margin,
            west: bbox.west - margin,
            east: bbox.east + margin,
        })
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }
}

/// 楕円体高からジオイド高を引いて正標高にする
pub fn orthometric_height<R: Raster + ?Sized>(geoid: &R, point: &GeoPoint) -> Result<f64> {
    let undulation = sample(geoid, point.lat, point.lon)?;
    Ok(point.height - undulation)
}

/// 正標高から地形標高を引いて AGL にする
pub fn agl_height<R: Raster + ?Sized>(
    terrain: &R,
    lat: f64,
    lon: f64,
    orthometric: f64,
) -> Result<f64> {
    let elevation = sample(terrain, lat, lon)?;
    Ok(orthometric - elevation)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AglPoint {
    pub index: usize,
    pub point: GeoPoint,
    pub orthometric_height: f64,
    pub terrain_elevation: f64,
    pub agl: f64,
    pub footprint: Option<FootprintPolygon>,
}

/// 一点分の失敗。入力順の番号を持つ。
#[derive(Debug)]
pub struct PointFailure {
    pub index: usize,
    pub point: GeoPoint,
    pub error: Error,
}

impl fmt::Display for PointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "point #{} ({}, {}): {}",
            self.index, self.point.lat, self.point.lon, self.error
        )
    }
}

impl std::error::Error for PointFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// 入力順
    pub converted: Vec<AglPoint>,
    /// 入力順
    pub failures: Vec<PointFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.converted.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 撮影点を AGL に変換する。ジオイドラスタが無ければ高さは正標高として扱う。
pub struct AglConverter<'a, R: Raster + ?Sized> {
    terrain: &'a R,
    geoid: Option<&'a R>,
    projector: Option<FootprintProjector>,
}

impl<'a, R: Raster + ?Sized> AglConverter<'a, R> {
    pub fn new(terrain: &'a R) -> Self {
        Self {
            terrain,
            geoid: None,
            projector: None,
        }
    }

    /// PPK モード: 楕円体高をジオイドで補正する
    pub fn with_geoid(mut self, geoid: &'a R) -> Self {
        self.geoid = Some(geoid);
        self
    }

    pub fn with_footprint(mut self, sensor: SensorModel) -> Self {
        self.projector = Some(FootprintProjector::new(sensor));
        self
    }

    pub fn convert(
        &self,
        index: usize,
        capture: &CapturePoint,
    ) -> std::result::Result<AglPoint, PointFailure> {
        let point = capture.position;
        self.convert_point(capture)
            .map(|(orthometric_height, terrain_elevation, agl, footprint)| AglPoint {
                index,
                point,
                orthometric_height,
                terrain_elevation,
                agl,
                footprint,
            })
            .map_err(|error| PointFailure {
                index,
                point,
                error,
            })
    }

    fn convert_point(
        &self,
        capture: &CapturePoint,
    ) -> Result<(f64, f64, f64, Option<FootprintPolygon>)> {
        let point = &capture.position;

        let orthometric = match self.geoid {
            Some(geoid) => orthometric_height(geoid, point)?,
            None => point.height,
        };
        let agl = agl_height(self.terrain, point.lat, point.lon, orthometric)?;
        let elevation = orthometric - agl;

        let footprint = match (&self.projector, capture.attitude) {
            (Some(projector), Some(attitude)) => {
                Some(projector.project(point.lat, point.lon, agl, attitude)?)
            }
            _ => None,
        };

        debug!(
            "({}, {}): height={} orthometric={} terrain={} agl={}",
            point.lat, point.lon, point.height, orthometric, elevation, agl
        );
        Ok((orthometric, elevation, agl, footprint))
    }
}

impl<'a, R: Raster + Sync + ?Sized> AglConverter<'a, R> {
    /// 全点を並列に変換する。結果は入力順。
    pub fn convert_all(&self, captures: &[CapturePoint]) -> BatchReport {
        let results: Vec<_> = captures
            .par_iter()
            .enumerate()
            .map(|(index, capture)| self.convert(index, capture))
            .collect();

        let mut report = BatchReport::default();
        for result in results {
            match result {
                Ok(point) => report.converted.push(point),
                Err(failure) => {
                    warn!("Failed to convert {}", failure);
                    report.failures.push(failure);
                }
            }
        }

        info!(
            "Converted {} of {} points to AGL",
            report.converted.len(),
            report.len()
        );
        report
    }
}
