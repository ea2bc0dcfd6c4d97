use crate::error::{Error, Result};

/// 回転項を持たないアフィン変換 (GDAL の geotransform に相当)
///
/// `(origin_x, pixel_width, 0, origin_y, 0, pixel_height)`。北が上のラスタでは
/// `pixel_height` は負になる。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub origin_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> Result<Self> {
        if !(origin_x.is_finite() && origin_y.is_finite()) {
            return Err(Error::InvalidGeoTransform(format!(
                "origin ({}, {}) is not finite",
                origin_x, origin_y
            )));
        }
        if !pixel_width.is_finite() || pixel_width == 0.0 {
            return Err(Error::InvalidGeoTransform(format!(
                "pixel width {} must be finite and nonzero",
                pixel_width
            )));
        }
        if !pixel_height.is_finite() || pixel_height == 0.0 {
            return Err(Error::InvalidGeoTransform(format!(
                "pixel height {} must be finite and nonzero",
                pixel_height
            )));
        }

        Ok(Self {
            origin_x,
            pixel_width,
            origin_y,
            pixel_height,
        })
    }

    /// GDAL 形式の6要素配列から生成する。回転項が0でなければエラー。
    pub fn from_coefficients(coefficients: [f64; 6]) -> Result<Self> {
        let [origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height] = coefficients;
        if rot_x != 0.0 || rot_y != 0.0 {
            return Err(Error::InvalidGeoTransform(format!(
                "rotated rasters are not supported (rotation terms {}, {})",
                rot_x, rot_y
            )));
        }
        Self::new(origin_x, pixel_width, origin_y, pixel_height)
    }

    pub fn coefficients(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// 地理座標 -> 小数のグリッド座標 (column, row)
    pub fn geo_to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            (lon - self.origin_x) / self.pixel_width,
            (lat - self.origin_y) / self.pixel_height,
        )
    }

    /// グリッド座標 -> 地理座標 (lon, lat)
    pub fn pixel_to_geo(&self, column: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + column * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }
}

/// 単一バンドのラスタ。サンプラーは読み取り専用で借用する。
pub trait Raster {
    fn geo_transform(&self) -> &GeoTransform;

    /// (cols, rows)
    fn size(&self) -> (usize, usize);

    fn no_data(&self) -> Option<f64> {
        None
    }

    /// `(x, y)` を左上とする `cols x rows` の窓を行優先で読む
    fn read_window(&self, x: isize, y: isize, cols: usize, rows: usize) -> Result<Vec<f64>>;

    /// 窓がラスタ範囲内に収まるか
    fn contains_window(&self, x: isize, y: isize, cols: usize, rows: usize) -> bool {
        let (width, height) = self.size();
        x >= 0
            && y >= 0
            && (x as usize).saturating_add(cols) <= width
            && (y as usize).saturating_add(rows) <= height
    }
}

/// メモリ上のラスタ (行優先)
#[derive(Debug, Clone, PartialEq)]
pub struct GridRaster {
    transform: GeoTransform,
    cols: usize,
    rows: usize,
    values: Vec<f64>,
    no_data: Option<f64>,
}

impl GridRaster {
    pub fn new(
        transform: GeoTransform,
        cols: usize,
        rows: usize,
        values: Vec<f64>,
        no_data: Option<f64>,
    ) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(Error::InvalidRaster(format!(
                "raster must not be empty ({} x {})",
                cols, rows
            )));
        }
        if values.len() != cols * rows {
            return Err(Error::InvalidRaster(format!(
                "expected {} values for {} x {} raster, got {}",
                cols * rows,
                cols,
                rows,
                values.len()
            )));
        }

        Ok(Self {
            transform,
            cols,
            rows,
            values,
            no_data,
        })
    }

    /// 全セルが同じ値のラスタ
    pub fn filled(transform: GeoTransform, cols: usize, rows: usize, value: f64) -> Result<Self> {
        Self::new(transform, cols, rows, vec![value; cols * rows], None)
    }

    /// `f(column, row)` で各セルの値を与える
    pub fn from_fn<F>(transform: GeoTransform, cols: usize, rows: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> f64,
    {
        let values = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (col, row)))
            .map(|(col, row)| f(col, row))
            .collect();
        Self::new(transform, cols, rows, values, None)
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn value(&self, col: usize, row: usize) -> Option<f64> {
        if col < self.cols && row < self.rows {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl Raster for GridRaster {
    fn geo_transform(&self) -> &GeoTransform {
        &self.transform
    }

    fn size(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    fn read_window(&self, x: isize, y: isize, cols: usize, rows: usize) -> Result<Vec<f64>> {
        if !self.contains_window(x, y, cols, rows) {
            return Err(Error::InvalidRaster(format!(
                "window ({}, {}) {} x {} exceeds raster size {} x {}",
                x, y, cols, rows, self.cols, self.rows
            )));
        }

        let (x, y) = (x as usize, y as usize);
        let mut window = Vec::with_capacity(cols * rows);
        for row in y..y + rows {
            let start = row * self.cols + x;
            window.extend_from_slice(&self.values[start..start + cols]);
        }
        Ok(window)
    }
}
