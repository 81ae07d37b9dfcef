//! Scattered-data interpolation over the measured points.
//!
//! Triangle-based methods build a Delaunay triangulation of the samples and
//! are undefined (`NaN`) outside its convex hull; nearest-neighbour lookup is
//! defined everywhere.

use crate::cubic::CubicInterpolator;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Barycentric slack so that lattice nodes lying on a shared edge or on the
/// hull are not lost to rounding.
const INSIDE_EPS: f64 = 1e-9;
/// Smallest `|det| / longest_edge²` of a usable triangle.
const DEGENERATE_EPS: f64 = 1e-12;

/// A scalar field sampled from scattered points.
pub trait Interpolator: Send + Sync {
    /// Value at `p`, `NaN` where the method is undefined.
    fn evaluate(&self, p: Point2<f64>) -> f64;

    /// Row-major values on the lattice `ys × xs`.
    fn evaluate_grid(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(xs.len() * ys.len());
        for &y in ys {
            for &x in xs {
                out.push(self.evaluate(Point2::new(x, y)));
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    Linear,
    #[default]
    Cubic,
    Nearest,
}

impl InterpolationMethod {
    pub const ALL: [InterpolationMethod; 3] = [Self::Linear, Self::Cubic, Self::Nearest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Cubic => "cubic",
            Self::Nearest => "nearest",
        }
    }

    /// Build the interpolator for `samples` (`(position, value)` pairs).
    pub fn build(&self, samples: &[(Point2<f64>, f64)]) -> Box<dyn Interpolator> {
        match self {
            Self::Linear => Box::new(LinearInterpolator::new(samples)),
            Self::Cubic => Box::new(CubicInterpolator::new(samples)),
            Self::Nearest => Box::new(NearestInterpolator::new(samples)),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown interpolation method `{0}` (expected linear, cubic or nearest)")]
pub struct UnknownMethod(pub String);

impl FromStr for InterpolationMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// Delaunay triangulation of the sample positions.
#[derive(Clone, Debug)]
pub(crate) struct Triangulation {
    pub points: Vec<Point2<f64>>,
    pub values: Vec<f64>,
    pub triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    pub fn new(samples: &[(Point2<f64>, f64)]) -> Self {
        let pts: Vec<delaunator::Point> = samples
            .iter()
            .map(|(p, _)| delaunator::Point { x: p.x, y: p.y })
            .collect();
        let tri = delaunator::triangulate(&pts);
        let triangles: Vec<[usize; 3]> = tri
            .triangles
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        if triangles.is_empty() {
            log::warn!("samples are collinear or coincident; triangle interpolation is empty");
        }
        Self {
            points: samples.iter().map(|(p, _)| *p).collect(),
            values: samples.iter().map(|(_, v)| *v).collect(),
            triangles,
        }
    }

    /// Barycentric weights of `p` in triangle `t`, `None` when outside or
    /// the triangle is degenerate.
    pub fn barycentric(&self, t: &[usize; 3], p: Point2<f64>) -> Option<[f64; 3]> {
        let [a, b, c] = t.map(|i| self.points[i]);
        let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
        let extent = (a - c)
            .norm_squared()
            .max((b - c).norm_squared())
            .max((a - b).norm_squared());
        if det.abs() <= DEGENERATE_EPS * extent {
            return None;
        }
        let u = ((b.y - c.y) * (p.x - c.x) + (c.x - b.x) * (p.y - c.y)) / det;
        let v = ((c.y - a.y) * (p.x - c.x) + (a.x - c.x) * (p.y - c.y)) / det;
        let w = 1.0 - u - v;
        (u >= -INSIDE_EPS && v >= -INSIDE_EPS && w >= -INSIDE_EPS).then_some([u, v, w])
    }

    pub fn locate(&self, p: Point2<f64>) -> Option<(usize, [f64; 3])> {
        self.triangles
            .iter()
            .enumerate()
            .find_map(|(i, t)| self.barycentric(t, p).map(|b| (i, b)))
    }

    /// Fill a lattice by walking each triangle's bounding box instead of
    /// locating every node.
    pub fn rasterize<F>(&self, xs: &[f64], ys: &[f64], mut value: F) -> Vec<f64>
    where
        F: FnMut(usize, [f64; 3]) -> f64,
    {
        let nx = xs.len();
        let mut out = vec![f64::NAN; nx * ys.len()];
        for (ti, t) in self.triangles.iter().enumerate() {
            let [a, b, c] = t.map(|i| self.points[i]);
            let (x0, x1) = (a.x.min(b.x).min(c.x), a.x.max(b.x).max(c.x));
            let (y0, y1) = (a.y.min(b.y).min(c.y), a.y.max(b.y).max(c.y));
            let ix = index_range(xs, x0, x1);
            let iy = index_range(ys, y0, y1);
            for j in iy {
                for i in ix.clone() {
                    let slot = &mut out[j * nx + i];
                    if !slot.is_nan() {
                        continue;
                    }
                    if let Some(bary) = self.barycentric(t, Point2::new(xs[i], ys[j])) {
                        *slot = value(ti, bary);
                    }
                }
            }
        }
        out
    }
}

/// Indices of the ascending `axis` whose values fall in `[lo, hi]` (with slack).
fn index_range(axis: &[f64], lo: f64, hi: f64) -> std::ops::Range<usize> {
    let slack = INSIDE_EPS * (1.0 + lo.abs().max(hi.abs()));
    let start = axis.partition_point(|&v| v < lo - slack);
    let end = axis.partition_point(|&v| v <= hi + slack);
    start..end.max(start)
}

/// Piecewise-linear interpolation on Delaunay triangles.
#[derive(Clone, Debug)]
pub struct LinearInterpolator {
    tri: Triangulation,
}

impl LinearInterpolator {
    pub fn new(samples: &[(Point2<f64>, f64)]) -> Self {
        Self {
            tri: Triangulation::new(samples),
        }
    }

    fn blend(&self, t: usize, [u, v, w]: [f64; 3]) -> f64 {
        let [a, b, c] = self.tri.triangles[t];
        u * self.tri.values[a] + v * self.tri.values[b] + w * self.tri.values[c]
    }
}

impl Interpolator for LinearInterpolator {
    fn evaluate(&self, p: Point2<f64>) -> f64 {
        match self.tri.locate(p) {
            Some((t, bary)) => self.blend(t, bary),
            None => f64::NAN,
        }
    }

    fn evaluate_grid(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        self.tri.rasterize(xs, ys, |t, bary| self.blend(t, bary))
    }
}

/// Value of the closest sample, via a k-d tree.
pub struct NearestInterpolator {
    tree: KdTree<f64, 2>,
    values: Vec<f64>,
}

impl NearestInterpolator {
    pub fn new(samples: &[(Point2<f64>, f64)]) -> Self {
        let coords: Vec<[f64; 2]> = samples.iter().map(|(p, _)| [p.x, p.y]).collect();
        let tree: KdTree<f64, 2> = (&coords).into();
        Self {
            tree,
            values: samples.iter().map(|(_, v)| *v).collect(),
        }
    }
}

impl Interpolator for NearestInterpolator {
    fn evaluate(&self, p: Point2<f64>) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let nn = self.tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y]);
        self.values
            .get(nn.item as usize)
            .copied()
            .unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square_samples() -> Vec<(Point2<f64>, f64)> {
        vec![
            (Point2::new(0.0, 0.0), 100.0),
            (Point2::new(10.0, 0.0), 200.0),
            (Point2::new(10.0, 10.0), 300.0),
            (Point2::new(0.0, 10.0), 200.0),
        ]
    }

    #[test]
    fn linear_is_exact_at_nodes_and_nan_outside() {
        let lin = LinearInterpolator::new(&square_samples());
        for (p, v) in square_samples() {
            assert_relative_eq!(lin.evaluate(p), v, epsilon = 1e-9);
        }
        assert!(lin.evaluate(Point2::new(-1.0, 5.0)).is_nan());
        assert!(lin.evaluate(Point2::new(5.0, 11.0)).is_nan());
    }

    #[test]
    fn linear_reproduces_planes() {
        let plane = |p: Point2<f64>| 3.0 + 2.0 * p.x - 0.5 * p.y;
        let samples: Vec<_> = [(0.0, 0.0), (4.0, 1.0), (1.0, 5.0), (6.0, 6.0), (3.0, 3.0)]
            .into_iter()
            .map(|(x, y)| {
                let p = Point2::new(x, y);
                (p, plane(p))
            })
            .collect();
        let lin = LinearInterpolator::new(&samples);
        let q = Point2::new(3.0, 2.5);
        assert_relative_eq!(lin.evaluate(q), plane(q), epsilon = 1e-9);
    }

    #[test]
    fn grid_rasterization_matches_pointwise() {
        let lin = LinearInterpolator::new(&square_samples());
        let xs = durometer_core::linspace(-1.0, 11.0, 13);
        let ys = durometer_core::linspace(-1.0, 11.0, 13);
        let grid = lin.evaluate_grid(&xs, &ys);
        for (j, &y) in ys.iter().enumerate() {
            for (i, &x) in xs.iter().enumerate() {
                let a = grid[j * xs.len() + i];
                let b = lin.evaluate(Point2::new(x, y));
                assert_eq!(a.is_nan(), b.is_nan(), "mismatch at ({x}, {y})");
                if !a.is_nan() {
                    assert_relative_eq!(a, b, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn degeneracy_is_judged_relative_to_triangle_size() {
        let tri = |pts: [(f64, f64); 3]| Triangulation {
            points: pts.iter().map(|&(x, y)| Point2::new(x, y)).collect(),
            values: vec![0.0; 3],
            triangles: vec![[0, 1, 2]],
        };
        let tiny = tri([(0.0, 0.0), (1e-9, 0.0), (0.0, 1e-9)]);
        assert!(tiny.locate(Point2::new(2e-10, 2e-10)).is_some());

        let sliver = tri([(0.0, 0.0), (1e6, 0.0), (2e6, 1e-6)]);
        assert!(sliver.locate(Point2::new(1e6, 0.0)).is_none());
    }

    #[test]
    fn collinear_samples_give_nan_everywhere() {
        let samples = vec![
            (Point2::new(0.0, 0.0), 1.0),
            (Point2::new(1.0, 1.0), 2.0),
            (Point2::new(2.0, 2.0), 3.0),
        ];
        let lin = LinearInterpolator::new(&samples);
        assert!(lin.evaluate(Point2::new(1.0, 1.0)).is_nan());
        assert!(lin
            .evaluate_grid(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0])
            .iter()
            .all(|v| v.is_nan()));
    }

    #[test]
    fn nearest_is_defined_everywhere() {
        let nn = NearestInterpolator::new(&square_samples());
        assert_relative_eq!(nn.evaluate(Point2::new(-50.0, -50.0)), 100.0);
        assert_relative_eq!(nn.evaluate(Point2::new(9.0, 9.5)), 300.0);
    }

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!("Cubic".parse::<InterpolationMethod>(), Ok(InterpolationMethod::Cubic));
        assert_eq!(
            " linear ".parse::<InterpolationMethod>(),
            Ok(InterpolationMethod::Linear)
        );
        assert!("spline".parse::<InterpolationMethod>().is_err());
        assert_eq!(InterpolationMethod::Nearest.to_string(), "nearest");
    }
}
