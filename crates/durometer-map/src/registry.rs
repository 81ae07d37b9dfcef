use durometer_core::{CalibrationState, RecalibrationPolicy};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A location on the surface image where an indentation will be measured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    pub id: String,
    pub position: Point2<f64>,
    /// Plot-pixel coordinate of the click, `None` for points restored from a
    /// project that only stores physical positions.
    pub pixel: Option<Point2<f64>>,
}

pub fn point_id(number: usize) -> String {
    format!("P{number}")
}

/// Numeric suffix of a `P{n}` id.
pub fn parse_point_id(id: &str) -> Option<usize> {
    id.strip_prefix('P')?.parse().ok()
}

/// Ordered list of marked points, ids `P1..Pn` in marking order.
#[derive(Clone, Debug, Default)]
pub struct PointRegistry {
    points: Vec<MeasurementPoint>,
    policy: RecalibrationPolicy,
}

impl PointRegistry {
    pub fn with_policy(policy: RecalibrationPolicy) -> Self {
        Self {
            points: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RecalibrationPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RecalibrationPolicy) {
        self.policy = policy;
    }

    /// Record a click at plot-pixel `pixel` and return the new point.
    pub fn mark(&mut self, pixel: Point2<f64>, calibration: &CalibrationState) -> &MeasurementPoint {
        let position = calibration.pixel_to_physical(pixel);
        self.push(position, Some(pixel))
    }

    /// Record a point already expressed in physical units.
    pub fn mark_physical(&mut self, position: Point2<f64>) -> &MeasurementPoint {
        self.push(position, None)
    }

    fn push(&mut self, position: Point2<f64>, pixel: Option<Point2<f64>>) -> &MeasurementPoint {
        let id = point_id(self.points.len() + 1);
        log::info!("{id} marked at ({:.3}, {:.3})", position.x, position.y);
        self.points.push(MeasurementPoint {
            id,
            position,
            pixel,
        });
        &self.points[self.points.len() - 1]
    }

    pub fn reset(&mut self) {
        self.points.clear();
    }

    /// Remove the point at `index` and renumber the rest.
    pub fn remove(&mut self, index: usize) -> Option<MeasurementPoint> {
        if index >= self.points.len() {
            return None;
        }
        let removed = self.points.remove(index);
        self.reindex();
        Some(removed)
    }

    /// Renumber ids to `P1..Pn` in current order.
    pub fn reindex(&mut self) {
        for (i, p) in self.points.iter_mut().enumerate() {
            p.id = point_id(i + 1);
        }
    }

    pub fn positions(&self) -> Vec<Point2<f64>> {
        self.points.iter().map(|p| p.position).collect()
    }

    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Apply the recalibration policy after the scale or origin changed.
    ///
    /// Returns how many positions were recomputed.
    pub fn recalibrate(&mut self, calibration: &CalibrationState) -> usize {
        if self.policy == RecalibrationPolicy::KeepCaptured {
            return 0;
        }
        let mut n = 0;
        for p in &mut self.points {
            if let Some(px) = p.pixel {
                p.position = calibration.pixel_to_physical(px);
                n += 1;
            }
        }
        log::debug!("recomputed {n} point positions");
        n
    }

    /// Replace all points with physical positions loaded from a project.
    pub fn restore(&mut self, positions: &[Point2<f64>]) {
        self.points = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| MeasurementPoint {
                id: point_id(i + 1),
                position,
                pixel: None,
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calib(scale: f64) -> CalibrationState {
        let mut c = CalibrationState::new(scale).expect("valid");
        c.attach_image(1000, 1000);
        c
    }

    #[test]
    fn ids_follow_marking_order() {
        let c = calib(0.01);
        let mut reg = PointRegistry::default();
        reg.mark(Point2::new(100.0, 200.0), &c);
        let p = reg.mark(Point2::new(300.0, 400.0), &c).clone();
        assert_eq!(p.id, "P2");
        assert_relative_eq!(p.position.x, 3.0);
        assert_relative_eq!(p.position.y, 4.0);
    }

    #[test]
    fn remove_renumbers() {
        let c = calib(1.0);
        let mut reg = PointRegistry::default();
        for i in 0..3 {
            reg.mark(Point2::new(i as f64, 0.0), &c);
        }
        let gone = reg.remove(0).expect("exists");
        assert_eq!(gone.id, "P1");
        let ids: Vec<_> = reg.points().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["P1", "P2"]);
        assert_relative_eq!(reg.positions()[0].x, 1.0);
        assert!(reg.remove(5).is_none());
    }

    #[test]
    fn keep_captured_ignores_scale_change() {
        let mut c = calib(1.0);
        let mut reg = PointRegistry::default();
        reg.mark(Point2::new(10.0, 10.0), &c);
        c.set_scale(2.0).expect("valid");
        assert_eq!(reg.recalibrate(&c), 0);
        assert_relative_eq!(reg.positions()[0].x, 10.0);
    }

    #[test]
    fn recompute_policy_uses_stored_pixels() {
        let mut c = calib(1.0);
        let mut reg = PointRegistry::with_policy(RecalibrationPolicy::RecomputeFromPixels);
        reg.mark(Point2::new(10.0, 10.0), &c);
        reg.mark_physical(Point2::new(7.0, 7.0));
        c.set_scale(2.0).expect("valid");
        c.set_origin(Point2::new(5.0, 0.0));
        assert_eq!(reg.recalibrate(&c), 1);
        assert_relative_eq!(reg.positions()[0].x, 15.0);
        assert_relative_eq!(reg.positions()[1].x, 7.0);
    }

    #[test]
    fn point_ids_parse() {
        assert_eq!(parse_point_id("P12"), Some(12));
        assert_eq!(parse_point_id("Q1"), None);
        assert_eq!(parse_point_id("P"), None);
    }
}
