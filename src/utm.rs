//! UTM ゾーンの選択と、WGS84 経緯度との相互変換。
//!
//! 投影計算は proj4rs に任せ、ここではゾーンの決め方と座標系の組み立てだけを持つ。

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use std::fmt;

use crate::error::{Error, Result};

const WGS84_GEOGRAPHIC: &str = "+proj=longlat +datum=WGS84 +no_defs";

const MIN_LATITUDE: f64 = -80.0;
const MAX_LATITUDE: f64 = 84.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub number: u8,
    pub hemisphere: Hemisphere,
}

impl UtmZone {
    pub fn new(number: u8, hemisphere: Hemisphere) -> Option<Self> {
        (1..=60)
            .contains(&number)
            .then_some(Self { number, hemisphere })
    }

    /// 中央子午線 (度)
    pub fn central_meridian(&self) -> f64 {
        (self.number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// WGS84 / UTM の EPSG コード (326xx / 327xx)
    pub fn epsg(&self) -> u32 {
        match self.hemisphere {
            Hemisphere::North => 32600 + self.number as u32,
            Hemisphere::South => 32700 + self.number as u32,
        }
    }

    /// proj4 形式の定義文字列
    pub fn proj_string(&self) -> String {
        match self.hemisphere {
            Hemisphere::North => format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                self.number
            ),
            Hemisphere::South => format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                self.number
            ),
        }
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = match self.hemisphere {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
        };
        write!(f, "{}{}", self.number, h)
    }
}

/// UTM 平面座標 (m)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmPoint {
    pub easting: f64,
    pub northing: f64,
}

impl UtmPoint {
    pub fn new(easting: f64, northing: f64) -> Self {
        Self { easting, northing }
    }

    pub fn offset(&self, east: f64, north: f64) -> Self {
        Self {
            easting: self.easting + east,
            northing: self.northing + north,
        }
    }
}

/// 一つのゾーンに固定した WGS84 <-> UTM 変換器。
///
/// 基準点 (カメラ位置) を覚えておき、逆変換の失敗もその座標で報告する。
pub struct UtmFrame {
    zone: UtmZone,
    origin: (f64, f64),
    geographic: Proj,
    projected: Proj,
}

impl fmt::Debug for UtmFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtmFrame")
            .field("zone", &self.zone)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl UtmFrame {
    /// `(lat, lon)` が属するゾーンの変換器
    pub fn at(lat: f64, lon: f64) -> Result<Self> {
        let zone = zone_for(lat, lon)?;
        Self::with_zone(lat, lon, zone)
    }

    pub fn with_zone(lat: f64, lon: f64, zone: UtmZone) -> Result<Self> {
        let geographic = Proj::from_proj_string(WGS84_GEOGRAPHIC).map_err(|e| {
            projection_error(lat, lon, format!("invalid geographic CRS: {:?}", e))
        })?;
        let projected = Proj::from_proj_string(&zone.proj_string()).map_err(|e| {
            projection_error(lat, lon, format!("invalid CRS for zone {}: {:?}", zone, e))
        })?;

        Ok(Self {
            zone,
            origin: (lat, lon),
            geographic,
            projected,
        })
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    /// 経緯度 (度) -> UTM
    pub fn forward(&self, lat: f64, lon: f64) -> Result<UtmPoint> {
        check_latitude(lat, lon)?;
        if !lon.is_finite() {
            return Err(projection_error(lat, lon, "longitude is not finite"));
        }

        let mut point = (normalize_longitude(lon).to_radians(), lat.to_radians(), 0.0);
        transform(&self.geographic, &self.projected, &mut point).map_err(|e| {
            projection_error(lat, lon, format!("forward projection failed: {:?}", e))
        })?;

        let (easting, northing, _) = point;
        if !(easting.is_finite() && northing.is_finite()) {
            return Err(projection_error(lat, lon, "projected coordinate is not finite"));
        }
        Ok(UtmPoint::new(easting, northing))
    }

    /// UTM -> 経緯度 (lat, lon)
    pub fn inverse(&self, point: UtmPoint) -> Result<(f64, f64)> {
        let (lat0, lon0) = self.origin;
        if !(point.easting.is_finite() && point.northing.is_finite()) {
            return Err(projection_error(
                lat0,
                lon0,
                format!(
                    "UTM coordinate ({}, {}) in zone {} is not finite",
                    point.easting, point.northing, self.zone
                ),
            ));
        }

        let mut coords = (point.easting, point.northing, 0.0);
        transform(&self.projected, &self.geographic, &mut coords).map_err(|e| {
            projection_error(
                lat0,
                lon0,
                format!(
                    "inverse projection of ({}, {}) in zone {} failed: {:?}",
                    point.easting, point.northing, self.zone, e
                ),
            )
        })?;

        let (lon, lat) = (coords.0.to_degrees(), coords.1.to_degrees());
        if !(lat.is_finite() && lon.is_finite()) {
            return Err(projection_error(
                lat0,
                lon0,
                format!("inverse projection in zone {} is not finite", self.zone),
            ));
        }
        Ok((lat, normalize_longitude(lon)))
    }
}

/// 経緯度が属する UTM ゾーン (ノルウェー・スバールバルの例外を含む)
pub fn zone_for(lat: f64, lon: f64) -> Result<UtmZone> {
    check_latitude(lat, lon)?;
    if !lon.is_finite() {
        return Err(projection_error(lat, lon, "longitude is not finite"));
    }

    let lon = normalize_longitude(lon);
    let mut number = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;

    if (56.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
        number = 32;
    } else if (72.0..=MAX_LATITUDE).contains(&lat) {
        number = match lon {
            l if (0.0..9.0).contains(&l) => 31,
            l if (9.0..21.0).contains(&l) => 33,
            l if (21.0..33.0).contains(&l) => 35,
            l if (33.0..42.0).contains(&l) => 37,
            _ => number,
        };
    }

    let hemisphere = if lat >= 0.0 {
        Hemisphere::North
    } else {
        Hemisphere::South
    };

    Ok(UtmZone { number, hemisphere })
}

/// 経緯度 (度) を指定ゾーンの UTM 座標に変換する
pub fn to_utm(lat: f64, lon: f64, zone: UtmZone) -> Result<UtmPoint> {
    UtmFrame::with_zone(lat, lon, zone)?.forward(lat, lon)
}

fn check_latitude(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
        return Err(projection_error(
            lat,
            lon,
            format!(
                "latitude must lie within the UTM range [{}, {}]",
                MIN_LATITUDE, MAX_LATITUDE
            ),
        ));
    }
    Ok(())
}

fn projection_error(lat: f64, lon: f64, reason: impl Into<String>) -> Error {
    Error::Projection {
        lat,
        lon,
        reason: reason.into(),
    }
}

/// 経度を [-180, 180) に正規化
fn normalize_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_for() {
        assert_eq!(
            zone_for(47.05, 8.05).unwrap(),
            UtmZone::new(32, Hemisphere::North).unwrap()
        );
        assert_eq!(
            zone_for(-33.86, 151.21).unwrap(),
            UtmZone::new(56, Hemisphere::South).unwrap()
        );
        assert_eq!(zone_for(0.0, -180.0).unwrap().number, 1);
        assert_eq!(zone_for(0.0, 180.0).unwrap().number, 1);
        assert_eq!(zone_for(0.0, 179.9).unwrap().number, 60);

        // ノルウェー西岸
        assert_eq!(zone_for(60.0, 5.0).unwrap().number, 32);
        // スバールバル
        assert_eq!(zone_for(78.0, 15.0).unwrap().number, 33);

        assert!(zone_for(85.0, 0.0).is_err());
        assert!(zone_for(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_zone_metadata() {
        let zone = UtmZone::new(32, Hemisphere::North).unwrap();
        assert_eq!(zone.central_meridian(), 9.0);
        assert_eq!(zone.epsg(), 32632);
        assert_eq!(zone.to_string(), "32N");
        assert_eq!(
            zone.proj_string(),
            "+proj=utm +zone=32 +datum=WGS84 +units=m +no_defs"
        );

        let south = UtmZone::new(56, Hemisphere::South).unwrap();
        assert_eq!(south.epsg(), 32756);
        assert!(south.proj_string().contains("+south"));
        assert!(UtmZone::new(0, Hemisphere::North).is_none());
        assert!(UtmZone::new(61, Hemisphere::North).is_none());
    }

    #[test]
    fn test_known_coordinate() {
        // CN Tower: 17T 630084 4833439
        let lat = 43.0 + 38.0 / 60.0 + 33.24 / 3600.0;
        let lon = -(79.0 + 23.0 / 60.0 + 13.7 / 3600.0);
        let zone = zone_for(lat, lon).unwrap();
        assert_eq!(zone.number, 17);

        let p = to_utm(lat, lon, zone).unwrap();
        assert!((p.easting - 630084.0).abs() < 1.0, "easting {}", p.easting);
        assert!((p.northing - 4833439.0).abs() < 1.0, "northing {}", p.northing);
    }

    #[test]
    fn test_central_meridian_on_equator() {
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        let p = to_utm(0.0, 3.0, zone).unwrap();
        assert!((p.easting - 500_000.0).abs() < 1e-3);
        assert!(p.northing.abs() < 1e-3);

        // 南半球は北距に 10,000km を加える
        let south = UtmZone::new(31, Hemisphere::South).unwrap();
        let p = to_utm(-0.001, 3.0, south).unwrap();
        assert!(p.northing > 9_999_000.0 && p.northing < 10_000_000.0);
    }

    #[test]
    fn test_round_trip() {
        let points = [
            (47.05, 8.05),
            (-33.8568, 151.2153),
            (35.6812, 139.7671),
            (64.1466, -21.9426),
            (-0.001, 0.001),
        ];

        for (lat, lon) in points {
            let frame = UtmFrame::at(lat, lon).unwrap();
            let p = frame.forward(lat, lon).unwrap();
            let (lat2, lon2) = frame.inverse(p).unwrap();

            // 1e-8 度 ≒ 1mm
            assert!((lat - lat2).abs() < 1e-8, "lat {} -> {}", lat, lat2);
            assert!((lon - lon2).abs() < 1e-8, "lon {} -> {}", lon, lon2);
        }
    }

    #[test]
    fn test_inverse_error_carries_origin() {
        let frame = UtmFrame::at(47.05, 8.05).unwrap();
        let err = frame.inverse(UtmPoint::new(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, Error::Projection { .. }));
        assert_eq!(err.coordinate(), Some((47.05, 8.05)));
    }
}
