//! Hardness mapping: measurement points, the per-point hardness table and
//! interpolated heat maps.
//!
//! Typical flow:
//! 1. mark points on a calibrated surface image with [`PointRegistry`],
//! 2. mirror them into a [`HardnessDataset`] and fill in hardness values,
//! 3. interpolate with [`build_field`] (or in the background via
//!    [`HeatMapJobs`]) and rasterize with [`render_field`].
//!
//! ```
//! use durometer_map::{build_field, FieldParams, HardnessDataRow, InterpolationMethod};
//! use std::path::PathBuf;
//!
//! let rows: Vec<HardnessDataRow> = [(0.0, 0.0, 200.0), (4.0, 0.0, 240.0), (0.0, 4.0, 260.0)]
//!     .into_iter()
//!     .enumerate()
//!     .map(|(i, (x, y, hv))| HardnessDataRow {
//!         id: format!("P{}", i + 1),
//!         x,
//!         y,
//!         hv: Some(hv),
//!         std_dev: None,
//!         image_path: PathBuf::new(),
//!     })
//!     .collect();
//! let params = FieldParams { grid_resolution: 16, method: InterpolationMethod::Linear, ..Default::default() };
//! let field = build_field(&rows, &params).unwrap();
//! assert_eq!(field.values.len(), 16 * 16);
//! ```

mod colormap;
mod cubic;
mod dataset;
mod heatmap;
mod interpolate;
mod jobs;
mod registry;
mod render;

pub use colormap::{ColorScale, UnknownColorScale};
pub use cubic::CubicInterpolator;
pub use dataset::{HardnessDataRow, HardnessDataset, ImagePathTemplate, IMAGE_EXTENSIONS};
pub use heatmap::{
    build_field, build_field_with, collect_samples, BuildStage, FieldParams, FieldStats,
    HeatMapError, HeatMapField, MIN_SAMPLES,
};
pub use interpolate::{
    InterpolationMethod, Interpolator, LinearInterpolator, NearestInterpolator, UnknownMethod,
};
pub use jobs::{
    CancelToken, HeatMapJobs, HeatMapOutput, HeatMapRequest, JobError, JobEvent, JobId,
};
pub use registry::{parse_point_id, point_id, MeasurementPoint, PointRegistry};
pub use render::{
    field_to_image, point_rings, render_field, RenderError, RenderOptions, MAX_RENDER_EDGE,
    OVERLAY_MARGIN,
};
