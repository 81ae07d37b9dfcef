//! High-level facade crate for the `durometer-*` workspace.
//!
//! This crate provides:
//! - re-exports of the calibration, Vickers, heat map and persistence crates
//! - [`Workbench`], which wires one specimen's components together
//! - (feature-gated) image file I/O on top of the `image` crate
//!
//! ## Quickstart
//!
//! ```
//! use durometer::core::Point2;
//! use durometer::project::{AppConfig, PreferencesStore};
//! use durometer::{ImageInfo, SurfaceClick, Workbench};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut wb = Workbench::new(AppConfig::default(), PreferencesStore::in_memory(), "specimen")?;
//! wb.attach_surface(&ImageInfo {
//!     path: "specimen/surface.png".into(),
//!     width: 800,
//!     height: 600,
//! });
//! wb.set_surface_scale(0.01)?;
//! let SurfaceClick::PointMarked(p) = wb.surface_click(Point2::new(120.0, 80.0)) else {
//!     unreachable!();
//! };
//! assert_eq!(p.id, "P1");
//! assert_eq!(wb.dataset().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `durometer::core`: calibration state, workflows, geometry, RGBA buffers, logging.
//! - `durometer::vickers`: the Vickers click state machine and HV statistics.
//! - `durometer::map`: point registry, hardness table, interpolation, rendering, background jobs.
//! - `durometer::project`: project JSON, preferences and the TOML config.
//! - `durometer::image_io` (feature `image`): decode and write image files.

pub use durometer_core as core;
pub use durometer_map as map;
pub use durometer_project as project;
pub use durometer_vickers as vickers;

pub use durometer_core::{CalibrationState, ImageError, ImageInfo, RgbaImage};
pub use durometer_map::{HardnessDataset, HeatMapField, InterpolationMethod, PointRegistry};
pub use durometer_project::{AppConfig, PreferencesStore, Project};
pub use durometer_vickers::{ClickOutcome, VickersSession};

mod workbench;

pub use workbench::{SurfaceClick, Workbench, WorkbenchError, HEATMAP_FILE, MAPPING_FILE, MAPS_DIR};

#[cfg(feature = "image")]
pub mod image_io;
