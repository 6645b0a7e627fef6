//! Fatigue scoring
//!
//! Accumulates per-session detection counts and turns them into a
//! [`FatigueLevel`] using one of three threshold tables:
//! - rate per second over the session (live camera, cumulative video)
//! - raw counts over a rolling 10-second window (monitor path)
//! - raw counts of a single image

pub mod cadence;
pub mod level;
pub mod modality;
pub mod policy;
pub mod stats;
pub mod window;

pub use cadence::{FatigueCadence, Reevaluation, DEFAULT_INTERVAL_SECS};
pub use level::FatigueLevel;
pub use modality::Modality;
pub use policy::{
    classify_rate, classify_single_image, classify_window_count, ClassificationPolicy, FatigueRates,
};
pub use stats::{ClassCounts, FatigueIndicator, SessionStats, Timebase};
pub use window::{RollingWindow, WINDOW_CAPACITY, WINDOW_SECONDS};
