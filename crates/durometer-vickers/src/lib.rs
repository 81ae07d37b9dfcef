//! Vickers hardness measurement on calibrated photomicrographs.
//!
//! A [`VickersSession`] collects four corner clicks per indentation, computes
//! the diagonals and hardness of each repetition, and once the required number
//! of repetitions is reached reports mean and sample standard deviation through
//! a [`HardnessRowUpdater`].
//!
//! ```
//! use durometer_vickers::{ClickOutcome, NoRows, VickersSession};
//! use nalgebra::Point2;
//!
//! let mut session = VickersSession::new(1.0, 500.0, 1).unwrap();
//! let mut last = ClickOutcome::Ignored;
//! for (x, y) in [(-25.0, 0.0), (0.0, 25.0), (25.0, 0.0), (0.0, -25.0)] {
//!     last = session.click(Point2::new(x, y), &mut NoRows);
//! }
//! assert!(matches!(last, ClickOutcome::MeasurementComplete { .. }));
//! ```

mod cursor;
mod hardness;
mod session;

pub use cursor::PointCursor;
pub use hardness::{vickers_hardness, MeasurementSummary, VickersRepetition, VICKERS_FACTOR};
pub use session::{
    normalize_path, ClickOutcome, CooldownTicket, HardnessRowUpdater, NoRows, ProcessingMode,
    VickersError, VickersSession, COOLDOWN, DEFAULT_LOAD_GRAMS, DEFAULT_REPETITIONS,
    DEFAULT_SCALE_UM_PER_PX, MAX_REPETITIONS,
};
