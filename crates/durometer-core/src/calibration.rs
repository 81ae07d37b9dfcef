//! Pixel to physical coordinate mapping and the interactive workflows that
//! edit it.
//!
//! Physical coordinates follow the plot convention of the measurement views:
//! `x` grows to the right, `y` grows upwards, and the lower-left image corner
//! sits at `-origin_offset`. Plot pixels use the same orientation; raw image
//! rows (top-down) are flipped with [`CalibrationState::image_pixel_to_physical`].

use crate::geometry::{distance, BoundingBox};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Errors produced by calibration operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("insufficient data: {0}")]
    InsufficientData(&'static str),
}

impl CalibrationError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// What happens to already captured physical coordinates when the scale or
/// origin changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalibrationPolicy {
    /// Keep the values captured under the calibration active at click time.
    #[default]
    KeepCaptured,
    /// Recompute physical positions from the stored pixel coordinates.
    RecomputeFromPixels,
}

/// Scale factor plus origin shift for one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    scale: f64,
    origin_offset: [f64; 2],
    #[serde(default)]
    image_size: Option<[u32; 2]>,
}

impl Default for CalibrationState {
    /// One physical unit per pixel, no origin shift, no image.
    fn default() -> Self {
        Self {
            scale: 1.0,
            origin_offset: [0.0, 0.0],
            image_size: None,
        }
    }
}

impl CalibrationState {
    /// Create a state with the given physical-units-per-pixel scale.
    pub fn new(scale: f64) -> Result<Self, CalibrationError> {
        validate_scale(scale)?;
        Ok(Self {
            scale,
            origin_offset: [0.0, 0.0],
            image_size: None,
        })
    }

    /// Rebuild a saved state. The image size is attached later on load.
    pub fn with_origin(scale: f64, origin_offset: [f64; 2]) -> Result<Self, CalibrationError> {
        let mut state = Self::new(scale)?;
        if origin_offset.iter().all(|v| v.is_finite()) {
            state.origin_offset = origin_offset;
        } else {
            log::warn!("ignoring non-finite origin offset {origin_offset:?}");
        }
        Ok(state)
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn origin_offset(&self) -> Vector2<f64> {
        Vector2::new(self.origin_offset[0], self.origin_offset[1])
    }

    #[inline]
    pub fn image_size(&self) -> Option<[u32; 2]> {
        self.image_size
    }

    #[inline]
    pub fn has_image(&self) -> bool {
        self.image_size.is_some()
    }

    /// Record the pixel size of a freshly loaded image. The origin is kept.
    pub fn attach_image(&mut self, width: u32, height: u32) {
        self.image_size = Some([width, height]);
    }

    pub fn detach_image(&mut self) {
        self.image_size = None;
    }

    /// Replace the scale. Returns the previous value.
    ///
    /// Already captured physical coordinates are not touched; callers that
    /// want them recomputed apply a [`RecalibrationPolicy`] themselves.
    pub fn set_scale(&mut self, new_scale: f64) -> Result<f64, CalibrationError> {
        validate_scale(new_scale)?;
        let previous = self.scale;
        self.scale = new_scale;
        log::debug!("scale changed {previous} -> {new_scale}");
        Ok(previous)
    }

    /// Derive a new scale from two points marked in current physical units
    /// and the real distance between them.
    ///
    /// The raw pixel distance is recovered by dividing out the current scale.
    pub fn calibrate_from_two_points(
        &mut self,
        p1: Point2<f64>,
        p2: Point2<f64>,
        known_real_distance: f64,
    ) -> Result<f64, CalibrationError> {
        if !known_real_distance.is_finite() || known_real_distance <= 0.0 {
            return Err(CalibrationError::invalid(
                "known_real_distance",
                format!("must be > 0 (got {known_real_distance})"),
            ));
        }
        let pixel_distance = distance(p1, p2) / self.scale;
        if pixel_distance <= f64::EPSILON {
            return Err(CalibrationError::invalid(
                "calibration points",
                "the two points coincide",
            ));
        }
        let new_scale = known_real_distance / pixel_distance;
        self.set_scale(new_scale)?;
        log::info!(
            "calibrated: {known_real_distance:.3} units over {pixel_distance:.2} px -> {new_scale:.6} units/px"
        );
        Ok(new_scale)
    }

    /// Make `point` the new (0, 0).
    ///
    /// Returns `false` and leaves the state untouched when no image is
    /// attached.
    pub fn set_origin(&mut self, point: Point2<f64>) -> bool {
        if !self.has_image() {
            log::warn!("set_origin ignored: no image loaded");
            return false;
        }
        self.origin_offset = [point.x, point.y];
        log::info!("origin set at ({:.3}, {:.3})", point.x, point.y);
        true
    }

    pub fn reset_origin(&mut self) {
        self.origin_offset = [0.0, 0.0];
    }

    /// Map a plot-pixel coordinate (y up) to physical units.
    #[inline]
    pub fn pixel_to_physical(&self, px: Point2<f64>) -> Point2<f64> {
        Point2::new(
            px.x * self.scale - self.origin_offset[0],
            px.y * self.scale - self.origin_offset[1],
        )
    }

    /// Inverse of [`Self::pixel_to_physical`].
    #[inline]
    pub fn physical_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(
            (p.x + self.origin_offset[0]) / self.scale,
            (p.y + self.origin_offset[1]) / self.scale,
        )
    }

    /// Map a raw image pixel (column, row counted from the top) to physical
    /// units. `None` without an attached image.
    pub fn image_pixel_to_physical(&self, col: f64, row: f64) -> Option<Point2<f64>> {
        let [_, h] = self.image_size?;
        Some(self.pixel_to_physical(Point2::new(col, h as f64 - row)))
    }

    /// Physical rectangle covered by the attached image.
    pub fn display_bounds(&self) -> Option<BoundingBox> {
        let [w, h] = self.image_size?;
        let bb = BoundingBox {
            min: [0.0, 0.0],
            max: [w as f64 * self.scale, h as f64 * self.scale],
        };
        Some(bb.shifted(-self.origin_offset()))
    }
}

fn validate_scale(scale: f64) -> Result<(), CalibrationError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(CalibrationError::invalid(
            "scale",
            format!("must be a positive finite number (got {scale})"),
        ));
    }
    Ok(())
}

/// Result of toggling an interactive workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowToggle {
    Started,
    Cancelled,
}

/// Phase of the two-point calibration workflow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationPhase {
    Idle,
    AwaitingFirstPoint,
    AwaitingSecondPoint {
        first: Point2<f64>,
    },
    AwaitingDistanceInput {
        first: Point2<f64>,
        second: Point2<f64>,
        pixel_distance: f64,
    },
}

/// Outcome of a click routed to the calibration workflow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationStep {
    Ignored,
    FirstPointRecorded,
    AwaitingDistance { pixel_distance: f64 },
}

/// `Idle -> AwaitingFirstPoint -> AwaitingSecondPoint -> AwaitingDistanceInput -> Idle`.
#[derive(Clone, Debug)]
pub struct CalibrationWorkflow {
    phase: CalibrationPhase,
}

impl Default for CalibrationWorkflow {
    fn default() -> Self {
        Self {
            phase: CalibrationPhase::Idle,
        }
    }
}

impl CalibrationWorkflow {
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != CalibrationPhase::Idle
    }

    /// Start the workflow, or cancel it when it is already running.
    pub fn toggle(&mut self, state: &CalibrationState) -> Result<WorkflowToggle, CalibrationError> {
        if self.is_active() {
            self.cancel();
            return Ok(WorkflowToggle::Cancelled);
        }
        if !state.has_image() {
            return Err(CalibrationError::InsufficientData("load an image first"));
        }
        self.phase = CalibrationPhase::AwaitingFirstPoint;
        log::info!("calibration started: mark two points on the image");
        Ok(WorkflowToggle::Started)
    }

    pub fn click(&mut self, p: Point2<f64>, state: &CalibrationState) -> CalibrationStep {
        match self.phase {
            CalibrationPhase::AwaitingFirstPoint => {
                self.phase = CalibrationPhase::AwaitingSecondPoint { first: p };
                CalibrationStep::FirstPointRecorded
            }
            CalibrationPhase::AwaitingSecondPoint { first } => {
                let pixel_distance = distance(first, p) / state.scale();
                log::info!("calibration pixel distance: {pixel_distance:.2}");
                self.phase = CalibrationPhase::AwaitingDistanceInput {
                    first,
                    second: p,
                    pixel_distance,
                };
                CalibrationStep::AwaitingDistance { pixel_distance }
            }
            CalibrationPhase::Idle | CalibrationPhase::AwaitingDistanceInput { .. } => {
                CalibrationStep::Ignored
            }
        }
    }

    /// Finish the workflow with the real distance between the two points.
    ///
    /// On error the workflow keeps waiting for a valid distance.
    pub fn submit_distance(
        &mut self,
        known_real_distance: f64,
        state: &mut CalibrationState,
    ) -> Result<f64, CalibrationError> {
        let CalibrationPhase::AwaitingDistanceInput { first, second, .. } = self.phase else {
            return Err(CalibrationError::InsufficientData(
                "two calibration points are required",
            ));
        };
        let scale = state.calibrate_from_two_points(first, second, known_real_distance)?;
        self.phase = CalibrationPhase::Idle;
        Ok(scale)
    }

    pub fn cancel(&mut self) {
        if self.is_active() {
            log::info!("calibration cancelled");
        }
        self.phase = CalibrationPhase::Idle;
    }
}

/// `Idle <-> AwaitingOriginClick`.
#[derive(Clone, Debug, Default)]
pub struct OriginWorkflow {
    active: bool,
}

impl OriginWorkflow {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn toggle(&mut self, state: &CalibrationState) -> Result<WorkflowToggle, CalibrationError> {
        if self.active {
            self.cancel();
            return Ok(WorkflowToggle::Cancelled);
        }
        if !state.has_image() {
            return Err(CalibrationError::InsufficientData("load an image first"));
        }
        self.active = true;
        Ok(WorkflowToggle::Started)
    }

    /// Returns `true` when the click set a new origin.
    pub fn click(&mut self, p: Point2<f64>, state: &mut CalibrationState) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        state.set_origin(p)
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn with_image(scale: f64) -> CalibrationState {
        let mut s = CalibrationState::new(scale).expect("valid scale");
        s.attach_image(2000, 1000);
        s
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(CalibrationState::new(0.0).is_err());
        let mut s = with_image(0.01);
        assert!(s.set_scale(-1.0).is_err());
        assert!(s.set_scale(f64::NAN).is_err());
        assert_relative_eq!(s.scale(), 0.01);
    }

    #[test]
    fn saved_origin_is_restored_without_image() {
        let s = CalibrationState::with_origin(0.5, [1.0, -2.0]).expect("valid");
        assert!(!s.has_image());
        assert_eq!(s.origin_offset(), Vector2::new(1.0, -2.0));
        let p = s.pixel_to_physical(Point2::new(4.0, 4.0));
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, 4.0);
        assert!(CalibrationState::with_origin(0.0, [0.0, 0.0]).is_err());
    }

    #[test]
    fn two_point_calibration_reconstructs_pixel_distance() {
        for &scale in &[0.001, 0.5, 1.0, 3.7] {
            let mut s = with_image(scale);
            let d_px: f64 = 250.0;
            let p1 = Point2::new(10.0 * scale, 20.0 * scale);
            let p2 = Point2::new((10.0 + 150.0) * scale, (20.0 + 200.0) * scale);
            let real = 12.5;
            let new_scale = s.calibrate_from_two_points(p1, p2, real).expect("calibrates");
            assert_relative_eq!(new_scale, real / d_px, max_relative = 1e-12);
            assert_relative_eq!(real / new_scale, d_px, max_relative = 1e-9);
        }
    }

    #[test]
    fn calibration_rejects_bad_distance_and_keeps_scale() {
        let mut s = with_image(0.2);
        let p1 = Point2::new(0.0, 0.0);
        let p2 = Point2::new(1.0, 0.0);
        assert!(matches!(
            s.calibrate_from_two_points(p1, p2, 0.0),
            Err(CalibrationError::InvalidParameter { .. })
        ));
        assert!(s.calibrate_from_two_points(p1, p1, 1.0).is_err());
        assert_relative_eq!(s.scale(), 0.2);
    }

    #[test]
    fn origin_shifts_physical_coordinates_and_bounds() {
        let mut s = with_image(0.01);
        assert!(s.set_origin(Point2::new(5.0, 2.0)));
        let p = s.pixel_to_physical(Point2::new(500.0, 200.0));
        assert_relative_eq!(p.x, 0.0);
        assert_relative_eq!(p.y, 0.0);
        let back = s.physical_to_pixel(p);
        assert_relative_eq!(back.x, 500.0, epsilon = 1e-9);
        let bb = s.display_bounds().expect("image attached");
        assert_relative_eq!(bb.min[0], -5.0);
        assert_relative_eq!(bb.max[0], 15.0);
        assert_relative_eq!(bb.max[1], 8.0);
    }

    #[test]
    fn image_rows_are_flipped() {
        let s = with_image(1.0);
        let p = s.image_pixel_to_physical(10.0, 0.0).expect("image");
        assert_relative_eq!(p.y, 1000.0);
    }

    #[test]
    fn set_origin_without_image_is_noop() {
        let mut s = CalibrationState::new(1.0).expect("valid");
        assert!(!s.set_origin(Point2::new(3.0, 3.0)));
        assert_eq!(s.origin_offset(), Vector2::zeros());
    }

    #[test]
    fn workflow_walks_all_phases() {
        let mut s = with_image(0.5);
        let mut wf = CalibrationWorkflow::default();
        assert_eq!(wf.toggle(&s), Ok(WorkflowToggle::Started));
        assert_eq!(
            wf.click(Point2::new(0.0, 0.0), &s),
            CalibrationStep::FirstPointRecorded
        );
        let step = wf.click(Point2::new(50.0, 0.0), &s);
        assert_eq!(
            step,
            CalibrationStep::AwaitingDistance {
                pixel_distance: 100.0
            }
        );
        assert!(wf.submit_distance(-3.0, &mut s).is_err());
        assert!(wf.is_active());
        let scale = wf.submit_distance(10.0, &mut s).expect("valid distance");
        assert_relative_eq!(scale, 0.1);
        assert_eq!(wf.phase(), CalibrationPhase::Idle);
    }

    #[test]
    fn workflow_cancel_discards_partial_input() {
        let s = with_image(0.5);
        let mut wf = CalibrationWorkflow::default();
        wf.toggle(&s).expect("starts");
        wf.click(Point2::new(1.0, 1.0), &s);
        assert_eq!(wf.toggle(&s), Ok(WorkflowToggle::Cancelled));
        assert_eq!(wf.phase(), CalibrationPhase::Idle);
        assert_eq!(wf.click(Point2::new(2.0, 2.0), &s), CalibrationStep::Ignored);
    }

    #[test]
    fn workflow_requires_image() {
        let s = CalibrationState::new(1.0).expect("valid");
        let mut wf = CalibrationWorkflow::default();
        assert!(matches!(
            wf.toggle(&s),
            Err(CalibrationError::InsufficientData(_))
        ));
        let mut ow = OriginWorkflow::default();
        assert!(ow.toggle(&s).is_err());
    }

    #[test]
    fn origin_workflow_sets_once() {
        let mut s = with_image(1.0);
        let mut ow = OriginWorkflow::default();
        ow.toggle(&s).expect("starts");
        assert!(ow.click(Point2::new(4.0, 4.0), &mut s));
        assert!(!ow.is_active());
        assert!(!ow.click(Point2::new(9.0, 9.0), &mut s));
        assert_relative_eq!(s.origin_offset().x, 4.0);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut s = with_image(0.25);
        s.set_origin(Point2::new(1.0, -2.0));
        let json = serde_json::to_string(&s).expect("serialize");
        let back: CalibrationState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, s);
    }
}
