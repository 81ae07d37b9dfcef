//! Cubic interpolation on Delaunay triangles.
//!
//! Each triangle carries a cubic Bézier patch whose boundary control points
//! come from the vertex values and gradients, so neighbouring patches agree
//! along shared edges. Vertex gradients are weighted least-squares fits to
//! the adjacent samples. Planes are reproduced exactly.

use crate::interpolate::{Interpolator, Triangulation};
use nalgebra::{Matrix2, Point2, Vector2};

/// Control net of one patch, ordered
/// `b300 b030 b003 b210 b120 b021 b012 b102 b201 b111`.
type ControlNet = [f64; 10];

#[derive(Clone, Debug)]
pub struct CubicInterpolator {
    tri: Triangulation,
    nets: Vec<ControlNet>,
}

impl CubicInterpolator {
    pub fn new(samples: &[(Point2<f64>, f64)]) -> Self {
        let tri = Triangulation::new(samples);
        let gradients = vertex_gradients(&tri);
        let nets = tri
            .triangles
            .iter()
            .map(|t| control_net(&tri, &gradients, t))
            .collect();
        Self { tri, nets }
    }

    fn patch(&self, t: usize, [u, v, w]: [f64; 3]) -> f64 {
        let b = &self.nets[t];
        u * u * u * b[0]
            + v * v * v * b[1]
            + w * w * w * b[2]
            + 3.0 * u * u * v * b[3]
            + 3.0 * u * v * v * b[4]
            + 3.0 * v * v * w * b[5]
            + 3.0 * v * w * w * b[6]
            + 3.0 * u * w * w * b[7]
            + 3.0 * u * u * w * b[8]
            + 6.0 * u * v * w * b[9]
    }
}

impl Interpolator for CubicInterpolator {
    fn evaluate(&self, p: Point2<f64>) -> f64 {
        match self.tri.locate(p) {
            Some((t, bary)) => self.patch(t, bary),
            None => f64::NAN,
        }
    }

    fn evaluate_grid(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        self.tri.rasterize(xs, ys, |t, bary| self.patch(t, bary))
    }
}

/// Gradient estimate per sample, zero where the neighbourhood does not
/// span two directions.
fn vertex_gradients(tri: &Triangulation) -> Vec<Vector2<f64>> {
    let n = tri.points.len();
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); n];
    for t in &tri.triangles {
        for k in 0..3 {
            let (a, b) = (t[k], t[(k + 1) % 3]);
            if !neighbours[a].contains(&b) {
                neighbours[a].push(b);
            }
            if !neighbours[b].contains(&a) {
                neighbours[b].push(a);
            }
        }
    }

    (0..n)
        .map(|i| {
            let p = tri.points[i];
            let f = tri.values[i];
            let mut ata = Matrix2::<f64>::zeros();
            let mut atb = Vector2::<f64>::zeros();
            for &j in &neighbours[i] {
                let d = tri.points[j] - p;
                let len2 = d.norm_squared();
                if len2 <= f64::EPSILON {
                    continue;
                }
                let w = 1.0 / len2;
                ata += w * d * d.transpose();
                atb += w * (tri.values[j] - f) * d;
            }
            ata.try_inverse()
                .map(|inv| inv * atb)
                .unwrap_or_else(Vector2::zeros)
        })
        .collect()
}

fn control_net(tri: &Triangulation, grads: &[Vector2<f64>], t: &[usize; 3]) -> ControlNet {
    let [ia, ib, ic] = *t;
    let (pa, pb, pc) = (tri.points[ia], tri.points[ib], tri.points[ic]);
    let (fa, fb, fc) = (tri.values[ia], tri.values[ib], tri.values[ic]);
    let (ga, gb, gc) = (grads[ia], grads[ib], grads[ic]);

    let edge = |f: f64, g: &Vector2<f64>, from: Point2<f64>, to: Point2<f64>| {
        f + g.dot(&(to - from)) / 3.0
    };
    let b210 = edge(fa, &ga, pa, pb);
    let b120 = edge(fb, &gb, pb, pa);
    let b021 = edge(fb, &gb, pb, pc);
    let b012 = edge(fc, &gc, pc, pb);
    let b102 = edge(fc, &gc, pc, pa);
    let b201 = edge(fa, &ga, pa, pc);

    let e = (b210 + b120 + b021 + b012 + b102 + b201) / 6.0;
    let v = (fa + fb + fc) / 3.0;
    let b111 = e + (e - v) / 2.0;

    [fa, fb, fc, b210, b120, b021, b012, b102, b201, b111]
}
