use durometer_core::{distance, mean, sample_std_dev};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Geometric factor `2 sin(136°/2)` of the Vickers indenter.
pub const VICKERS_FACTOR: f64 = 1.854;

/// Vickers hardness for a load in grams and a mean diagonal in micrometres.
///
/// Returns `0.0` (and warns) for a non-positive diagonal.
pub fn vickers_hardness(load_grams: f64, d_avg_um: f64) -> f64 {
    if d_avg_um <= 0.0 {
        log::warn!("mean diagonal is {d_avg_um} um, hardness set to 0");
        return 0.0;
    }
    let load_kgf = load_grams / 1000.0;
    let d_mm = d_avg_um / 1000.0;
    VICKERS_FACTOR * load_kgf / (d_mm * d_mm)
}

/// One completed indentation: four corners clicked in order and the derived values.
///
/// Corners 1 and 3 span the first diagonal, corners 2 and 4 the second.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VickersRepetition {
    points: [[f64; 2]; 4],
    d1: f64,
    d2: f64,
    d_avg: f64,
    hv: f64,
}

impl VickersRepetition {
    pub fn from_vertices(vertices: [Point2<f64>; 4], load_grams: f64) -> Self {
        let d1 = distance(vertices[0], vertices[2]);
        let d2 = distance(vertices[1], vertices[3]);
        let d_avg = (d1 + d2) / 2.0;
        Self {
            points: vertices.map(|p| [p.x, p.y]),
            d1,
            d2,
            d_avg,
            hv: vickers_hardness(load_grams, d_avg),
        }
    }

    pub fn vertices(&self) -> [Point2<f64>; 4] {
        self.points.map(|[x, y]| Point2::new(x, y))
    }

    #[inline]
    pub fn d1(&self) -> f64 {
        self.d1
    }

    #[inline]
    pub fn d2(&self) -> f64 {
        self.d2
    }

    #[inline]
    pub fn d_avg(&self) -> f64 {
        self.d_avg
    }

    #[inline]
    pub fn hv(&self) -> f64 {
        self.hv
    }
}

/// Averages over the repetitions recorded so far.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasurementSummary {
    pub count: usize,
    pub required: usize,
    pub d1_mean: f64,
    pub d2_mean: f64,
    pub d_avg_mean: f64,
    pub hv_mean: f64,
    pub hv_std_dev: f64,
}

impl MeasurementSummary {
    /// `None` for an empty set.
    pub fn from_repetitions(reps: &[VickersRepetition], required: usize) -> Option<Self> {
        let column = |f: fn(&VickersRepetition) -> f64| reps.iter().map(f).collect::<Vec<_>>();
        let hv = column(VickersRepetition::hv);
        Some(Self {
            count: reps.len(),
            required,
            d1_mean: mean(&column(VickersRepetition::d1))?,
            d2_mean: mean(&column(VickersRepetition::d2))?,
            d_avg_mean: mean(&column(VickersRepetition::d_avg))?,
            hv_mean: mean(&hv)?,
            hv_std_dev: sample_std_dev(&hv),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.count >= self.required
    }
}
