use crate::dataset::HardnessDataRow;
use crate::interpolate::InterpolationMethod;
use durometer_core::{linspace, BoundingBox};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fewest points with a hardness value that still produce a map.
pub const MIN_SAMPLES: usize = 3;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HeatMapError {
    #[error("at least 3 points with HV > 0 are needed (have {available})")]
    InsufficientData { available: usize },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("heat map generation cancelled")]
    Cancelled,
}

/// Parameters for [`build_field`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldParams {
    /// Lattice nodes per axis.
    pub grid_resolution: usize,
    /// Bounding-box padding as a fraction of the data range, per side.
    pub padding_fraction: f64,
    pub method: InterpolationMethod,
}

impl Default for FieldParams {
    fn default() -> Self {
        Self {
            grid_resolution: 500,
            padding_fraction: 0.10,
            method: InterpolationMethod::Cubic,
        }
    }
}

impl FieldParams {
    pub fn validate(&self) -> Result<(), HeatMapError> {
        if self.grid_resolution < 2 {
            return Err(HeatMapError::InvalidParameter {
                name: "grid_resolution",
                reason: format!("must be >= 2 (got {})", self.grid_resolution),
            });
        }
        if !self.padding_fraction.is_finite() || self.padding_fraction < 0.0 {
            return Err(HeatMapError::InvalidParameter {
                name: "padding_fraction",
                reason: format!("must be >= 0 (got {})", self.padding_fraction),
            });
        }
        Ok(())
    }
}

/// Summary of the hardness values that fed the map.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl FieldStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        let mean = durometer_core::mean(values)?;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Some(Self {
            count: values.len(),
            min,
            max,
            mean,
        })
    }
}

/// Interpolated hardness on a regular lattice.
#[derive(Clone, Debug)]
pub struct HeatMapField {
    pub grid_x: Vec<f64>,
    pub grid_y: Vec<f64>,
    /// Row-major, `grid_y.len() * grid_x.len()`, `NaN` where undefined.
    pub values: Vec<f64>,
    pub bounds: BoundingBox,
    pub stats: FieldStats,
    pub samples: Vec<(Point2<f64>, f64)>,
    pub method: InterpolationMethod,
}

impl HeatMapField {
    #[inline]
    pub fn value(&self, ix: usize, iy: usize) -> Option<f64> {
        if ix >= self.grid_x.len() {
            return None;
        }
        self.values.get(iy * self.grid_x.len() + ix).copied()
    }

    /// Smallest and largest defined value, `None` when every node is `NaN`.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }
}

/// Stage boundaries reported by [`build_field_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    Samples,
    Interpolator,
    Grid,
}

impl BuildStage {
    /// Share of the work done once this stage has finished.
    pub fn progress(&self) -> f32 {
        match self {
            Self::Samples => 0.1,
            Self::Interpolator => 0.3,
            Self::Grid => 0.8,
        }
    }
}

/// Rows with `hv > 0`, as `(position, hv)`.
pub fn collect_samples(rows: &[HardnessDataRow]) -> Vec<(Point2<f64>, f64)> {
    rows.iter()
        .filter_map(|r| r.valid_hv().map(|hv| (r.position(), hv)))
        .collect()
}

/// Interpolate the hardness table onto a regular lattice.
pub fn build_field(
    rows: &[HardnessDataRow],
    params: &FieldParams,
) -> Result<HeatMapField, HeatMapError> {
    build_field_with(rows, params, |_| true)
}

/// [`build_field`] with a checkpoint called after each stage; returning
/// `false` aborts with [`HeatMapError::Cancelled`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(rows, checkpoint), fields(rows = rows.len()))
)]
pub fn build_field_with<F>(
    rows: &[HardnessDataRow],
    params: &FieldParams,
    mut checkpoint: F,
) -> Result<HeatMapField, HeatMapError>
where
    F: FnMut(BuildStage) -> bool,
{
    params.validate()?;
    let samples = collect_samples(rows);
    if samples.len() < MIN_SAMPLES {
        return Err(HeatMapError::InsufficientData {
            available: samples.len(),
        });
    }
    let hv: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
    let stats = FieldStats::from_values(&hv).ok_or(HeatMapError::InsufficientData {
        available: 0,
    })?;
    let bounds = BoundingBox::from_points(samples.iter().map(|(p, _)| *p))
        .ok_or(HeatMapError::InsufficientData { available: 0 })?
        .padded(params.padding_fraction);
    log::info!(
        "heat map from {} points, HV {:.1}..{:.1}, {} interpolation",
        stats.count,
        stats.min,
        stats.max,
        params.method
    );
    if !checkpoint(BuildStage::Samples) {
        return Err(HeatMapError::Cancelled);
    }

    let interpolator = params.method.build(&samples);
    if !checkpoint(BuildStage::Interpolator) {
        return Err(HeatMapError::Cancelled);
    }

    let n = params.grid_resolution;
    let grid_x = linspace(bounds.min[0], bounds.max[0], n);
    let grid_y = linspace(bounds.min[1], bounds.max[1], n);
    let values = interpolator.evaluate_grid(&grid_x, &grid_y);
    if !checkpoint(BuildStage::Grid) {
        return Err(HeatMapError::Cancelled);
    }

    let field = HeatMapField {
        grid_x,
        grid_y,
        values,
        bounds,
        stats,
        samples,
        method: params.method,
    };
    log::debug!("lattice {n}x{n}: {} defined nodes", field.defined_count());
    Ok(field)
}
