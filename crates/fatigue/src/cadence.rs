//! Debounced re-evaluation cadence

use crate::level::FatigueLevel;
use serde::{Deserialize, Serialize};

/// Default interval between two fatigue evaluations (seconds)
pub const DEFAULT_INTERVAL_SECS: f64 = 10.0;

/// Outcome of a cadence check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "level", rename_all = "snake_case")]
pub enum Reevaluation {
    /// The interval elapsed and the level was recomputed
    Recomputed(FatigueLevel),
    /// Still inside the interval; the previous level is returned unchanged
    Held(FatigueLevel),
}

impl Reevaluation {
    pub fn level(&self) -> FatigueLevel {
        match self {
            Reevaluation::Recomputed(level) | Reevaluation::Held(level) => *level,
        }
    }

    pub fn is_recomputed(&self) -> bool {
        matches!(self, Reevaluation::Recomputed(_))
    }
}

/// Minimum spacing between evaluations, measured on a session's timebase.
///
/// Positions are seconds since session start: wall-clock seconds for live
/// streams, `frames / fps` for video, so the same interval covers
/// `interval * fps` frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatigueCadence {
    pub interval_secs: f64,
}

impl Default for FatigueCadence {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl FatigueCadence {
    pub fn new(interval_secs: f64) -> Self {
        Self { interval_secs }
    }

    /// Whether an evaluation is due at `position`.
    ///
    /// A session that was never evaluated is always due.
    pub fn is_due(&self, last_check: Option<f64>, position: f64) -> bool {
        match last_check {
            None => true,
            Some(last) => position - last >= self.interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_checked_is_due() {
        assert!(FatigueCadence::default().is_due(None, 0.0));
    }

    #[test]
    fn test_interval_boundary() {
        let cadence = FatigueCadence::default();
        assert!(!cadence.is_due(Some(0.0), 9.999));
        assert!(cadence.is_due(Some(0.0), 10.0));
        assert!(cadence.is_due(Some(5.0), 15.5));
    }

    #[test]
    fn test_reevaluation_level() {
        assert_eq!(Reevaluation::Held(FatigueLevel::Mild).level(), FatigueLevel::Mild);
        assert!(Reevaluation::Recomputed(FatigueLevel::None).is_recomputed());
    }
}
