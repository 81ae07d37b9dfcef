//! Interactive Vickers measurement: four clicks per indentation, a fixed number
//! of repetitions per image, then the mean hardness is written back to the
//! dataset row that references the image.

use crate::hardness::{MeasurementSummary, VickersRepetition};
use durometer_core::{mean, sample_std_dev, CalibrationError, CalibrationState};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Pause between two repetitions before the next one may start.
pub const COOLDOWN: Duration = Duration::from_secs(2);
pub const MAX_REPETITIONS: usize = 10;
pub const DEFAULT_REPETITIONS: usize = 2;
pub const DEFAULT_LOAD_GRAMS: f64 = 500.0;
/// Default micrograph scale in micrometres per pixel.
pub const DEFAULT_SCALE_UM_PER_PX: f64 = 1.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VickersError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Receives the final hardness of a completed measurement.
///
/// Implemented by the dataset; the session never sees the concrete type.
pub trait HardnessRowUpdater {
    /// Store `hv` and `std_dev` on the row whose image path matches
    /// `image_path` after normalization. Returns the updated row id.
    fn update_by_image_path(&mut self, image_path: &Path, hv: f64, std_dev: f64)
        -> Option<String>;
}

/// Updater that drops every result, for sessions without a dataset.
#[derive(Debug, Default)]
pub struct NoRows;

impl HardnessRowUpdater for NoRows {
    fn update_by_image_path(&mut self, _: &Path, _: f64, _: f64) -> Option<String> {
        None
    }
}

/// Lexical path normalization: drops `.`, folds `name/..`, keeps leading `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    MarkPoints,
    PanImage,
}

/// Handle for a scheduled cooldown. Firing a ticket issued before the last
/// reset does nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownTicket {
    generation: u64,
    pub delay: Duration,
}

impl CooldownTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClickOutcome {
    /// Panning mode, or a click that carries no measurement meaning.
    Ignored,
    VertexRecorded {
        repetition: usize,
        vertex: usize,
    },
    /// A repetition finished and more are required; the caller schedules `cooldown`.
    RepetitionFinalized {
        repetition: VickersRepetition,
        index: usize,
        cooldown: CooldownTicket,
    },
    MeasurementComplete {
        repetition: VickersRepetition,
        hv_mean: f64,
        std_dev: f64,
        updated_row: Option<String>,
    },
    RejectedComplete,
    RejectedCooldown,
}

#[derive(Clone, Debug)]
pub struct VickersSession {
    calibration: CalibrationState,
    mode: ProcessingMode,
    load_grams: f64,
    required_repetitions: usize,
    repetition_index: usize,
    current_vertices: Vec<Point2<f64>>,
    repetitions: Vec<VickersRepetition>,
    image_path: Option<PathBuf>,
    generation: u64,
    cooldown: Option<u64>,
}

impl Default for VickersSession {
    fn default() -> Self {
        Self {
            calibration: CalibrationState::default(),
            mode: ProcessingMode::MarkPoints,
            load_grams: DEFAULT_LOAD_GRAMS,
            required_repetitions: DEFAULT_REPETITIONS,
            repetition_index: 0,
            current_vertices: Vec::with_capacity(4),
            repetitions: Vec::new(),
            image_path: None,
            generation: 0,
            cooldown: None,
        }
    }
}

impl VickersSession {
    pub fn new(
        scale_um_per_px: f64,
        load_grams: f64,
        required_repetitions: usize,
    ) -> Result<Self, VickersError> {
        let mut s = Self {
            calibration: CalibrationState::new(scale_um_per_px)?,
            ..Self::default()
        };
        s.set_load(load_grams)?;
        s.set_required_repetitions(required_repetitions)?;
        Ok(s)
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationState {
        &mut self.calibration
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ProcessingMode) {
        self.mode = mode;
    }

    pub fn load_grams(&self) -> f64 {
        self.load_grams
    }

    pub fn required_repetitions(&self) -> usize {
        self.required_repetitions
    }

    pub fn repetitions(&self) -> &[VickersRepetition] {
        &self.repetitions
    }

    pub fn current_vertices(&self) -> &[Point2<f64>] {
        &self.current_vertices
    }

    pub fn repetition_index(&self) -> usize {
        self.repetition_index
    }

    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.repetitions.len() >= self.required_repetitions
    }

    /// Clear all progress. `required_repetitions` and load are kept and any
    /// pending cooldown becomes stale.
    pub fn reset(&mut self) {
        self.repetitions.clear();
        self.current_vertices.clear();
        self.repetition_index = 0;
        self.cooldown = None;
        self.generation += 1;
        log::debug!("vickers session reset (generation {})", self.generation);
    }

    pub fn set_required_repetitions(&mut self, n: usize) -> Result<(), VickersError> {
        if !(1..=MAX_REPETITIONS).contains(&n) {
            return Err(VickersError::InvalidParameter {
                name: "required_repetitions",
                reason: format!("must be in 1..={MAX_REPETITIONS} (got {n})"),
            });
        }
        self.required_repetitions = n;
        self.reset();
        Ok(())
    }

    /// Change the test load. Repetitions already recorded keep their hardness.
    pub fn set_load(&mut self, grams: f64) -> Result<(), VickersError> {
        if !grams.is_finite() || grams <= 0.0 {
            return Err(VickersError::InvalidParameter {
                name: "load_grams",
                reason: format!("must be > 0 (got {grams})"),
            });
        }
        self.load_grams = grams;
        Ok(())
    }

    /// Switch to a new micrograph. Progress on the previous image is discarded.
    pub fn load_image(&mut self, path: impl Into<PathBuf>, width: u32, height: u32) {
        let path = path.into();
        log::info!("vickers image: {}", path.display());
        self.image_path = Some(path);
        self.calibration.attach_image(width, height);
        self.reset();
    }

    /// Restore repetitions saved in a project. Entries beyond `required` are
    /// dropped.
    pub fn restore(
        &mut self,
        required: usize,
        mut repetitions: Vec<VickersRepetition>,
    ) -> Result<(), VickersError> {
        self.set_required_repetitions(required)?;
        if repetitions.len() > required {
            log::warn!(
                "project holds {} repetitions, keeping the first {required}",
                repetitions.len()
            );
            repetitions.truncate(required);
        }
        self.repetition_index = repetitions.len();
        self.repetitions = repetitions;
        Ok(())
    }

    pub fn summary(&self) -> Option<MeasurementSummary> {
        MeasurementSummary::from_repetitions(&self.repetitions, self.required_repetitions)
    }

    /// Route a click given in plot pixels through the micrograph calibration.
    pub fn click_pixel(
        &mut self,
        px: Point2<f64>,
        rows: &mut dyn HardnessRowUpdater,
    ) -> ClickOutcome {
        let p = self.calibration.pixel_to_physical(px);
        self.click(p, rows)
    }

    /// Record a click in physical units (micrometres).
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, rows)))]
    pub fn click(&mut self, p: Point2<f64>, rows: &mut dyn HardnessRowUpdater) -> ClickOutcome {
        if self.mode != ProcessingMode::MarkPoints {
            return ClickOutcome::Ignored;
        }
        if self.is_complete() {
            log::warn!(
                "all {} measurements done; reset to start a new set",
                self.required_repetitions
            );
            return ClickOutcome::RejectedComplete;
        }
        if self.cooldown.is_some() {
            return ClickOutcome::RejectedCooldown;
        }
        if self.current_vertices.len() >= 4 {
            self.repetition_index += 1;
            self.current_vertices.clear();
        }

        self.current_vertices.push(p);
        let vertex = self.current_vertices.len();
        log::debug!(
            "measurement {}, vertex {vertex}: ({:.1}, {:.1})",
            self.repetition_index + 1,
            p.x,
            p.y
        );
        if vertex < 4 {
            return ClickOutcome::VertexRecorded {
                repetition: self.repetition_index + 1,
                vertex,
            };
        }
        self.finalize_repetition(rows)
    }

    fn finalize_repetition(&mut self, rows: &mut dyn HardnessRowUpdater) -> ClickOutcome {
        let vertices = [
            self.current_vertices[0],
            self.current_vertices[1],
            self.current_vertices[2],
            self.current_vertices[3],
        ];
        let repetition = VickersRepetition::from_vertices(vertices, self.load_grams);
        log::info!(
            "measurement {} done: d1={:.2} d2={:.2} d_avg={:.2} HV={:.1}",
            self.repetitions.len() + 1,
            repetition.d1(),
            repetition.d2(),
            repetition.d_avg(),
            repetition.hv()
        );
        self.repetitions.push(repetition.clone());
        self.current_vertices.clear();
        self.repetition_index += 1;

        if !self.is_complete() {
            self.cooldown = Some(self.generation);
            return ClickOutcome::RepetitionFinalized {
                repetition,
                index: self.repetitions.len(),
                cooldown: CooldownTicket {
                    generation: self.generation,
                    delay: COOLDOWN,
                },
            };
        }

        let hv: Vec<f64> = self.repetitions.iter().map(VickersRepetition::hv).collect();
        let hv_mean = mean(&hv).unwrap_or(0.0);
        let std_dev = sample_std_dev(&hv);
        let updated_row = match &self.image_path {
            Some(path) => rows.update_by_image_path(path, hv_mean, std_dev),
            None => None,
        };
        match &updated_row {
            Some(id) => log::info!("HV={hv_mean:.1} +/-{std_dev:.2} stored on {id}"),
            None => log::info!("HV={hv_mean:.1} +/-{std_dev:.2} (no matching row)"),
        }
        ClickOutcome::MeasurementComplete {
            repetition,
            hv_mean,
            std_dev,
            updated_row,
        }
    }

    /// Called when a cooldown delay has elapsed. Returns `true` when the ticket
    /// was current and the session is ready for the next repetition.
    pub fn fire_cooldown(&mut self, ticket: CooldownTicket) -> bool {
        if self.cooldown != Some(ticket.generation) || ticket.generation != self.generation {
            log::trace!("stale cooldown ticket {}", ticket.generation);
            return false;
        }
        self.cooldown = None;
        log::debug!(
            "ready for measurement {}/{}",
            self.repetitions.len() + 1,
            self.required_repetitions
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(PathBuf, f64, f64)>,
    }

    impl HardnessRowUpdater for Recorder {
        fn update_by_image_path(&mut self, path: &Path, hv: f64, sd: f64) -> Option<String> {
            self.calls.push((path.to_path_buf(), hv, sd));
            Some("P1".to_string())
        }
    }

    fn indentation(
        session: &mut VickersSession,
        half: f64,
        rows: &mut dyn HardnessRowUpdater,
    ) -> ClickOutcome {
        let pts = [(-half, 0.0), (0.0, half), (half, 0.0), (0.0, -half)];
        let mut last = ClickOutcome::Ignored;
        for (x, y) in pts {
            last = session.click(Point2::new(x, y), rows);
        }
        last
    }

    fn session(n: usize) -> VickersSession {
        let mut s = VickersSession::new(1.0, 500.0, n).expect("valid session");
        s.load_image("imgs/1 400x.jpg", 640, 480);
        s
    }

    #[test]
    fn first_three_clicks_record_vertices() {
        let mut s = session(2);
        let out = s.click(Point2::new(1.0, 1.0), &mut NoRows);
        assert_eq!(
            out,
            ClickOutcome::VertexRecorded {
                repetition: 1,
                vertex: 1
            }
        );
        assert_eq!(s.current_vertices().len(), 1);
    }

    #[test]
    fn single_repetition_completes_with_zero_std() {
        let mut s = session(1);
        let mut rec = Recorder::default();
        let out = indentation(&mut s, 25.0, &mut rec);
        match out {
            ClickOutcome::MeasurementComplete {
                hv_mean,
                std_dev,
                updated_row,
                ..
            } => {
                assert_relative_eq!(hv_mean, 370.8, epsilon = 1e-9);
                assert_eq!(std_dev, 0.0);
                assert_eq!(updated_row.as_deref(), Some("P1"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(rec.calls.len(), 1);
        assert_eq!(rec.calls[0].0, PathBuf::from("imgs/1 400x.jpg"));
    }

    #[test]
    fn clicks_after_completion_are_rejected() {
        let mut s = session(1);
        indentation(&mut s, 10.0, &mut NoRows);
        assert_eq!(
            s.click(Point2::new(0.0, 0.0), &mut NoRows),
            ClickOutcome::RejectedComplete
        );
        assert_eq!(s.repetitions().len(), 1);
    }

    #[test]
    fn cooldown_blocks_until_fired() {
        let mut s = session(2);
        let out = indentation(&mut s, 10.0, &mut NoRows);
        let ticket = match out {
            ClickOutcome::RepetitionFinalized { cooldown, index, .. } => {
                assert_eq!(index, 1);
                assert_eq!(cooldown.delay, COOLDOWN);
                cooldown
            }
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(
            s.click(Point2::new(0.0, 0.0), &mut NoRows),
            ClickOutcome::RejectedCooldown
        );
        assert!(s.fire_cooldown(ticket));
        let mut rec = Recorder::default();
        let out = indentation(&mut s, 20.0, &mut rec);
        assert!(matches!(out, ClickOutcome::MeasurementComplete { .. }));
        assert_eq!(rec.calls.len(), 1);
    }

    #[test]
    fn stale_cooldown_is_noop_after_reset() {
        let mut s = session(3);
        let ticket = match indentation(&mut s, 10.0, &mut NoRows) {
            ClickOutcome::RepetitionFinalized { cooldown, .. } => cooldown,
            other => panic!("unexpected outcome {other:?}"),
        };
        s.reset();
        assert!(!s.fire_cooldown(ticket));
        assert!(!s.is_cooling_down());
        assert!(s.repetitions().is_empty());
        // a fresh set can start right away
        assert!(matches!(
            s.click(Point2::new(0.0, 0.0), &mut NoRows),
            ClickOutcome::VertexRecorded { .. }
        ));
    }

    #[test]
    fn changing_required_repetitions_mid_sequence_resets() {
        let mut s = session(3);
        s.click(Point2::new(0.0, 0.0), &mut NoRows);
        s.click(Point2::new(1.0, 0.0), &mut NoRows);
        let gen = s.generation();
        s.set_required_repetitions(5).expect("in range");
        assert_eq!(s.required_repetitions(), 5);
        assert!(s.current_vertices().is_empty());
        assert!(s.repetitions().is_empty());
        assert_eq!(s.repetition_index(), 0);
        assert!(s.generation() > gen);
    }

    #[test]
    fn required_repetitions_out_of_range_keeps_state() {
        let mut s = session(3);
        s.click(Point2::new(0.0, 0.0), &mut NoRows);
        assert!(s.set_required_repetitions(0).is_err());
        assert!(s.set_required_repetitions(11).is_err());
        assert_eq!(s.required_repetitions(), 3);
        assert_eq!(s.current_vertices().len(), 1);
    }

    #[test]
    fn pan_mode_ignores_clicks() {
        let mut s = session(2);
        s.set_mode(ProcessingMode::PanImage);
        assert_eq!(s.click(Point2::new(0.0, 0.0), &mut NoRows), ClickOutcome::Ignored);
        assert!(s.current_vertices().is_empty());
    }

    #[test]
    fn load_must_be_positive() {
        let mut s = session(2);
        assert!(s.set_load(0.0).is_err());
        assert!(s.set_load(-5.0).is_err());
        assert_relative_eq!(s.load_grams(), 500.0);
    }

    #[test]
    fn pixel_clicks_use_micrograph_scale() {
        let mut s = VickersSession::new(0.5, 500.0, 1).expect("valid");
        s.load_image("a.png", 100, 100);
        let pts = [(-50.0, 0.0), (0.0, 50.0), (50.0, 0.0), (0.0, -50.0)];
        let mut out = ClickOutcome::Ignored;
        for (x, y) in pts {
            out = s.click_pixel(Point2::new(x, y), &mut NoRows);
        }
        let ClickOutcome::MeasurementComplete { repetition, .. } = out else {
            panic!("expected completion");
        };
        assert_relative_eq!(repetition.d_avg(), 50.0);
    }

    #[test]
    fn restore_truncates_to_required() {
        let mut s = session(2);
        let reps: Vec<_> = (1..=3)
            .map(|i| {
                let h = i as f64 * 5.0;
                VickersRepetition::from_vertices(
                    [
                        Point2::new(-h, 0.0),
                        Point2::new(0.0, h),
                        Point2::new(h, 0.0),
                        Point2::new(0.0, -h),
                    ],
                    500.0,
                )
            })
            .collect();
        s.restore(2, reps).expect("valid");
        assert_eq!(s.repetitions().len(), 2);
        assert!(s.is_complete());
        let summary = s.summary().expect("non-empty");
        assert_relative_eq!(summary.d1_mean, 15.0);
    }

    #[test]
    fn normalize_path_folds_dots() {
        assert_eq!(
            normalize_path(Path::new("proj/./imgs/../imgs/1 400x.jpg")),
            PathBuf::from("proj/imgs/1 400x.jpg")
        );
        assert_eq!(normalize_path(Path::new("../a/./b")), PathBuf::from("../a/b"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }
}
