//! Fatigue classification policies
//!
//! Three threshold tables are in use and they are deliberately kept apart:
//! the rate table for continuous streams and two count tables (rolling
//! window and one-shot image).

use crate::level::FatigueLevel;
use crate::stats::ClassCounts;
use serde::{Deserialize, Serialize};

/// Named classification strategy, selected by modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPolicy {
    /// Per-second event frequency over elapsed session time (camera, cumulative video)
    RatePerSecond,
    /// Raw counts over the current batch or most recent window (rolling analyzer)
    WindowCount,
    /// Raw counts of one image
    SingleImage,
}

impl ClassificationPolicy {
    /// Classify accumulated counts.
    ///
    /// `elapsed_seconds` is only consulted by [`RatePerSecond`](Self::RatePerSecond).
    pub fn classify(&self, counts: &ClassCounts, elapsed_seconds: f64) -> FatigueLevel {
        match self {
            ClassificationPolicy::RatePerSecond => {
                classify_rate(elapsed_seconds, counts.closed_eyes, counts.open_mouth)
            }
            ClassificationPolicy::WindowCount => {
                classify_window_count(counts.closed_eyes, counts.open_mouth)
            }
            ClassificationPolicy::SingleImage => {
                classify_single_image(counts.closed_eyes, counts.open_mouth)
            }
        }
    }
}

/// Per-second frequencies of the fatigue indicators
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueRates {
    pub closed_eyes_per_second: f64,
    pub open_mouth_per_second: f64,
}

impl FatigueRates {
    /// Rates over `elapsed_seconds`; both zero when no time has elapsed
    pub fn compute(elapsed_seconds: f64, closed_eyes: u64, open_mouth: u64) -> Self {
        assert!(
            elapsed_seconds.is_finite(),
            "elapsed time must be finite, got {}",
            elapsed_seconds
        );
        if elapsed_seconds <= 0.0 {
            return Self::default();
        }
        Self {
            closed_eyes_per_second: closed_eyes as f64 / elapsed_seconds,
            open_mouth_per_second: open_mouth as f64 / elapsed_seconds,
        }
    }
}

/// Rate table. First match wins:
///
/// | closed eyes / s | open mouth / s | level |
/// |---|---|---|
/// | >= 6.0 | >= 2.0 | severe |
/// | >= 4.0 | >= 1.5 | moderate |
/// | >= 2.0 | >= 0.8 | mild |
///
/// Otherwise, and whenever `elapsed_seconds <= 0`, `none`.
pub fn classify_rate(elapsed_seconds: f64, closed_eyes: u64, open_mouth: u64) -> FatigueLevel {
    let rates = FatigueRates::compute(elapsed_seconds, closed_eyes, open_mouth);
    if elapsed_seconds <= 0.0 {
        return FatigueLevel::None;
    }

    let ce = rates.closed_eyes_per_second;
    let om = rates.open_mouth_per_second;

    if ce >= 6.0 || om >= 2.0 {
        FatigueLevel::Severe
    } else if ce >= 4.0 || om >= 1.5 {
        FatigueLevel::Moderate
    } else if ce >= 2.0 || om >= 0.8 {
        FatigueLevel::Mild
    } else {
        FatigueLevel::None
    }
}

/// Window count table: `ce >= 5 || om >= 3` high, `ce >= 3 || om >= 2` medium, else low
pub fn classify_window_count(closed_eyes: u64, open_mouth: u64) -> FatigueLevel {
    if closed_eyes >= 5 || open_mouth >= 3 {
        FatigueLevel::High
    } else if closed_eyes >= 3 || open_mouth >= 2 {
        FatigueLevel::Medium
    } else {
        FatigueLevel::Low
    }
}

/// Single image table: `ce >= 2 || om >= 1` high, `ce >= 1` medium, else low
pub fn classify_single_image(closed_eyes: u64, open_mouth: u64) -> FatigueLevel {
    if closed_eyes >= 2 || open_mouth >= 1 {
        FatigueLevel::High
    } else if closed_eyes >= 1 {
        FatigueLevel::Medium
    } else {
        FatigueLevel::Low
    }
}
