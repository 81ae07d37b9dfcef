//! Core types shared by the `durometer-*` crates.
//!
//! Geometry helpers, the pixel/physical calibration state with its
//! interactive workflows, a lightweight RGBA raster and the logger. The crate
//! does not decode images itself; the facade crate bridges to `image`.

mod calibration;
mod geometry;
mod image;
mod logger;

pub use calibration::{
    CalibrationError, CalibrationPhase, CalibrationState, CalibrationStep, CalibrationWorkflow,
    OriginWorkflow, RecalibrationPolicy, WorkflowToggle,
};
pub use geometry::{distance, linspace, mean, sample_std_dev, BoundingBox};
pub use image::{ImageError, ImageInfo, Rgba, RgbaImage};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};

pub use nalgebra::{Point2, Vector2};
