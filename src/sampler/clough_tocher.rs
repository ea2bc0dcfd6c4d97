//! 三角形分割上の Clough-Tocher 補間 (区分三次、C1 連続)。
//!
//! 各三角形を重心で3分割し、頂点の値と勾配から Bézier 係数を決める。
//! 頂点の勾配は、辺に沿った二階微分の二乗積分を最小にするよう
//! Gauss-Seidel 反復で推定する。

use nalgebra::{Matrix2, Point2, Vector2};
use thiserror::Error;
use tracing::warn;

const GRADIENT_MAX_ITER: usize = 400;
const GRADIENT_TOLERANCE: f64 = 1e-6;
const BARYCENTRIC_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MeshError {
    #[error("expected {expected} values, got {actual}")]
    ValueCount { expected: usize, actual: usize },

    #[error("triangle {0} is degenerate")]
    DegenerateTriangle(usize),

    #[error("gradient system at vertex {0} is singular")]
    SingularVertex(usize),

    #[error("query point lies outside the triangulation")]
    OutsideHull,
}

#[derive(Debug, Clone)]
pub struct Triangulation {
    points: Vec<Point2<f64>>,
    triangles: Vec<[usize; 3]>,
    /// 重心座標への変換 (頂点2を原点とする辺ベクトル行列の逆)
    transforms: Vec<Matrix2<f64>>,
    /// `neighbors[t][m]` は三角形 t の頂点 m の対辺を共有する三角形
    neighbors: Vec<[Option<usize>; 3]>,
    /// 辺で結ばれた頂点 (昇順)
    adjacency: Vec<Vec<usize>>,
}

impl Triangulation {
    /// 行優先に並んだ `cols x rows` の格子点を、各セルを左上-右下の対角線で二分して分割する
    pub fn regular_grid(
        points: Vec<Point2<f64>>,
        cols: usize,
        rows: usize,
    ) -> Result<Self, MeshError> {
        if points.len() != cols * rows {
            return Err(MeshError::ValueCount {
                expected: cols * rows,
                actual: points.len(),
            });
        }

        let mut triangles = Vec::new();
        for k in 0..rows.saturating_sub(1) {
            for j in 0..cols.saturating_sub(1) {
                let a = k * cols + j;
                let b = a + 1;
                let c = a + cols;
                let d = c + 1;
                triangles.push([a, b, d]);
                triangles.push([a, d, c]);
            }
        }

        let transforms = triangles
            .iter()
            .enumerate()
            .map(|(t, tri)| {
                let [p0, p1, p2] = tri.map(|i| points[i]);
                Matrix2::from_columns(&[p0 - p2, p1 - p2])
                    .try_inverse()
                    .ok_or(MeshError::DegenerateTriangle(t))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let neighbors = triangles
            .iter()
            .enumerate()
            .map(|(t, tri)| {
                [0, 1, 2].map(|m| {
                    let (u, v) = (tri[(m + 1) % 3], tri[(m + 2) % 3]);
                    triangles
                        .iter()
                        .enumerate()
                        .find(|(s, other)| *s != t && other.contains(&u) && other.contains(&v))
                        .map(|(s, _)| s)
                })
            })
            .collect();

        let mut adjacency = vec![Vec::new(); points.len()];
        for tri in &triangles {
            for &a in tri {
                for &b in tri {
                    if a != b && !adjacency[a].contains(&b) {
                        adjacency[a].push(b);
                    }
                }
            }
        }
        for vertices in &mut adjacency {
            vertices.sort_unstable();
        }

        Ok(Self {
            points,
            triangles,
            transforms,
            neighbors,
            adjacency,
        })
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// 点 `p` の三角形 `t` に対する重心座標
    fn barycentric(&self, t: usize, p: Point2<f64>) -> [f64; 3] {
        let origin = self.points[self.triangles[t][2]];
        let c = self.transforms[t] * (p - origin);
        [c.x, c.y, 1.0 - c.x - c.y]
    }

    /// `p` を含む最初の三角形と重心座標
    fn locate(&self, p: Point2<f64>) -> Option<(usize, [f64; 3])> {
        (0..self.triangles.len())
            .map(|t| (t, self.barycentric(t, p)))
            .find(|(_, b)| b.iter().all(|&c| c >= -BARYCENTRIC_EPS))
    }

    /// 各頂点の勾配を推定する
    pub fn estimate_gradients(&self, values: &[f64]) -> Result<Vec<Vector2<f64>>, MeshError> {
        self.check_values(values)?;

        let mut gradients = vec![Vector2::zeros(); self.points.len()];
        for _ in 0..GRADIENT_MAX_ITER {
            let mut err = 0.0f64;

            for (i, neighbours) in self.adjacency.iter().enumerate() {
                let mut q = Matrix2::zeros();
                let mut s = Vector2::zeros();

                for &j in neighbours {
                    let e = self.points[j] - self.points[i];
                    let l3 = e.norm().powi(3);
                    let df2 = -e.dot(&gradients[j]);

                    q += e * e.transpose() * (4.0 / l3);
                    s += e * ((6.0 * (values[i] - values[j]) - 2.0 * df2) / l3);
                }

                let r = q.try_inverse().ok_or(MeshError::SingularVertex(i))? * s;
                let change = (gradients[i] + r).amax() / r.amax().max(1.0);
                gradients[i] = -r;
                err = err.max(change);
            }

            if err < GRADIENT_TOLERANCE {
                return Ok(gradients);
            }
        }

        warn!(
            "Gradient estimation did not converge in {} iterations",
            GRADIENT_MAX_ITER
        );
        Ok(gradients)
    }

    /// 頂点値 `values` を通る曲面を `p` で評価する
    pub fn interpolate(&self, values: &[f64], p: Point2<f64>) -> Result<f64, MeshError> {
        let gradients = self.estimate_gradients(values)?;
        let (t, b) = self.locate(p).ok_or(MeshError::OutsideHull)?;
        Ok(self.evaluate(t, b, values, &gradients))
    }

    fn check_values(&self, values: &[f64]) -> Result<(), MeshError> {
        if values.len() != self.points.len() {
            return Err(MeshError::ValueCount {
                expected: self.points.len(),
                actual: values.len(),
            });
        }
        Ok(())
    }

    /// 三角形 `t` 上の Clough-Tocher 曲面を重心座標 `b` で評価する
    fn evaluate(
        &self,
        t: usize,
        b: [f64; 3],
        values: &[f64],
        gradients: &[Vector2<f64>],
    ) -> f64 {
        let tri = self.triangles[t];
        let [p1, p2, p3] = tri.map(|i| self.points[i]);
        let [f1, f2, f3] = tri.map(|i| values[i]);
        let [g1, g2, g3] = tri.map(|i| gradients[i]);

        let e12 = p2 - p1;
        let e23 = p3 - p2;
        let e31 = p1 - p3;

        // 辺方向の微分
        let df12 = g1.dot(&e12);
        let df21 = -g2.dot(&e12);
        let df23 = g2.dot(&e23);
        let df32 = -g3.dot(&e23);
        let df31 = g3.dot(&e31);
        let df13 = -g1.dot(&e31);

        let c3000 = f1;
        let c2100 = (df12 + 3.0 * c3000) / 3.0;
        let c2010 = (df13 + 3.0 * c3000) / 3.0;
        let c0300 = f2;
        let c1200 = (df21 + 3.0 * c0300) / 3.0;
        let c0210 = (df23 + 3.0 * c0300) / 3.0;
        let c0030 = f3;
        let c1020 = (df31 + 3.0 * c0030) / 3.0;
        let c0120 = (df32 + 3.0 * c0030) / 3.0;

        let c2001 = (c2100 + c2010 + c3000) / 3.0;
        let c0201 = (c1200 + c0300 + c0210) / 3.0;
        let c0021 = (c1020 + c0120 + c0030) / 3.0;

        // 辺を横切る微分の方向は、隣接三角形の重心への向き。
        // 境界辺では対頂点へ向かう方向を使う。
        let mut g = [-0.5; 3];
        for (k, gk) in g.iter_mut().enumerate() {
            let Some(other) = self.neighbors[t][k] else {
                continue;
            };
            let [q1, q2, q3] = self.triangles[other].map(|i| self.points[i].coords);
            let centroid = Point2::from((q1 + q2 + q3) / 3.0);
            let c = self.barycentric(t, centroid);

            *gk = match k {
                0 => (2.0 * c[2] + c[1] - 1.0) / (2.0 - 3.0 * c[2] - 3.0 * c[1]),
                1 => (2.0 * c[0] + c[2] - 1.0) / (2.0 - 3.0 * c[0] - 3.0 * c[2]),
                _ => (2.0 * c[1] + c[0] - 1.0) / (2.0 - 3.0 * c[1] - 3.0 * c[0]),
            };
        }

        let c0111 = (g[0] * (-c0300 + 3.0 * c0210 - 3.0 * c0120 + c0030)
            + (-c0300 + 2.0 * c0210 - c0120 + c0021 + c0201))
            / 2.0;
        let c1011 = (g[1] * (-c0030 + 3.0 * c1020 - 3.0 * c2010 + c3000)
            + (-c0030 + 2.0 * c1020 - c2010 + c2001 + c0021))
            / 2.0;
        let c1101 = (g[2] * (-c3000 + 3.0 * c2100 - 3.0 * c1200 + c0300)
            + (-c3000 + 2.0 * c2100 - c1200 + c2001 + c0201))
            / 2.0;

        let c1002 = (c1101 + c1011 + c2001) / 3.0;
        let c0102 = (c1101 + c0111 + c0201) / 3.0;
        let c0012 = (c1011 + c0111 + c0021) / 3.0;
        let c0003 = (c1002 + c0102 + c0012) / 3.0;

        // 重心で分けた小三角形の座標。4つのうち1つは0になる。
        let min = b[0].min(b[1]).min(b[2]);
        let (b1, b2, b3, b4) = (b[0] - min, b[1] - min, b[2] - min, 3.0 * min);

        b1.powi(3) * c3000
            + 3.0 * b1 * b1 * b2 * c2100
            + 3.0 * b1 * b1 * b3 * c2010
            + 3.0 * b1 * b1 * b4 * c2001
            + 3.0 * b1 * b2 * b2 * c1200
            + 6.0 * b1 * b2 * b4 * c1101
            + 3.0 * b1 * b3 * b3 * c1020
            + 6.0 * b1 * b3 * b4 * c1011
            + 3.0 * b1 * b4 * b4 * c1002
            + b2.powi(3) * c0300
            + 3.0 * b2 * b2 * b3 * c0210
            + 3.0 * b2 * b2 * b4 * c0201
            + 3.0 * b2 * b3 * b3 * c0120
            + 6.0 * b2 * b3 * b4 * c0111
            + 3.0 * b2 * b4 * b4 * c0102
            + b3.powi(3) * c0030
            + 3.0 * b3 * b3 * b4 * c0021
            + 3.0 * b3 * b4 * b4 * c0012
            + b4.powi(3) * c0003
    }
}
