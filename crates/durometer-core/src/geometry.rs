use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: Point2<f64>, b: Point2<f64>) -> f64 {
    (b - a).norm()
}

/// `n` evenly spaced samples over `[start, end]`, endpoints included.
///
/// `n == 1` yields `[start]`; `n == 0` yields an empty vector.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        end
                    } else {
                        start + step * i as f64
                    }
                })
                .collect()
        }
    }
}

/// Axis-aligned bounding box in physical units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl BoundingBox {
    /// Smallest box containing all `points`, `None` for an empty input.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point2<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bb = BoundingBox {
            min: [first.x, first.y],
            max: [first.x, first.y],
        };
        for p in iter {
            bb.min[0] = bb.min[0].min(p.x);
            bb.min[1] = bb.min[1].min(p.y);
            bb.max[0] = bb.max[0].max(p.x);
            bb.max[1] = bb.max[1].max(p.y);
        }
        Some(bb)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max[1] - self.min[1]
    }

    /// Grow each axis by `fraction * range` on both sides.
    ///
    /// An axis with zero range stays degenerate.
    pub fn padded(&self, fraction: f64) -> Self {
        let px = self.width() * fraction;
        let py = self.height() * fraction;
        BoundingBox {
            min: [self.min[0] - px, self.min[1] - py],
            max: [self.max[0] + px, self.max[1] + py],
        }
    }

    pub fn contains(&self, p: Point2<f64>) -> bool {
        p.x >= self.min[0] && p.x <= self.max[0] && p.y >= self.min[1] && p.y <= self.max[1]
    }

    /// Translate the box by `offset`.
    pub fn shifted(&self, offset: Vector2<f64>) -> Self {
        BoundingBox {
            min: [self.min[0] + offset.x, self.min[1] + offset.y],
            max: [self.max[0] + offset.x, self.max[1] + offset.y],
        }
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Bessel-corrected sample standard deviation.
///
/// Defined as `0.0` for fewer than two samples.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}
