//! Detection classes and normalized detection events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detections at or below this confidence are discarded before accumulation
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Eye / mouth state classes produced by the fatigue model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    ClosedEyes,
    ClosedMouth,
    OpenEyes,
    OpenMouth,
}

impl DetectionClass {
    /// All classes in model class-id order
    pub const ALL: [DetectionClass; 4] = [
        DetectionClass::ClosedEyes,
        DetectionClass::ClosedMouth,
        DetectionClass::OpenEyes,
        DetectionClass::OpenMouth,
    ];

    /// Map a model class id to a class (unknown ids yield `None`)
    pub fn from_class_id(class_id: i64) -> Option<Self> {
        match class_id {
            0 => Some(DetectionClass::ClosedEyes),
            1 => Some(DetectionClass::ClosedMouth),
            2 => Some(DetectionClass::OpenEyes),
            3 => Some(DetectionClass::OpenMouth),
            _ => None,
        }
    }

    /// Model class id
    pub fn class_id(&self) -> i64 {
        match self {
            DetectionClass::ClosedEyes => 0,
            DetectionClass::ClosedMouth => 1,
            DetectionClass::OpenEyes => 2,
            DetectionClass::OpenMouth => 3,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionClass::ClosedEyes => "closed_eyes",
            DetectionClass::ClosedMouth => "closed_mouth",
            DetectionClass::OpenEyes => "open_eyes",
            DetectionClass::OpenMouth => "open_mouth",
        }
    }

    /// Only closed eyes and open mouth (yawning) drive fatigue classification
    pub fn is_fatigue_indicator(&self) -> bool {
        matches!(self, DetectionClass::ClosedEyes | DetectionClass::OpenMouth)
    }
}

/// One box as reported by a classifier, before normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: i64,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(class_id: i64, confidence: f32) -> Self {
        Self { class_id, confidence }
    }
}

/// One observed object in one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub class: DetectionClass,
    pub confidence: f32,
    pub observed_at: DateTime<Utc>,
}

/// Normalize raw classifier output into detection events.
///
/// Keeps only boxes with a known class id and `confidence > MIN_CONFIDENCE`.
pub fn normalize(
    raw: &[RawDetection],
    observed_at: DateTime<Utc>,
) -> impl Iterator<Item = DetectionEvent> + '_ {
    raw.iter().filter_map(move |det| {
        if !(det.confidence > MIN_CONFIDENCE) {
            return None;
        }
        DetectionClass::from_class_id(det.class_id).map(|class| DetectionEvent {
            class,
            confidence: det.confidence,
            observed_at,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_id_mapping() {
        for class in DetectionClass::ALL {
            assert_eq!(DetectionClass::from_class_id(class.class_id()), Some(class));
        }
        assert_eq!(DetectionClass::from_class_id(4), None);
        assert_eq!(DetectionClass::from_class_id(-1), None);
    }

    #[test]
    fn test_fatigue_indicators() {
        assert!(DetectionClass::ClosedEyes.is_fatigue_indicator());
        assert!(DetectionClass::OpenMouth.is_fatigue_indicator());
        assert!(!DetectionClass::OpenEyes.is_fatigue_indicator());
        assert!(!DetectionClass::ClosedMouth.is_fatigue_indicator());
    }

    #[test]
    fn test_normalize_filters_confidence_strictly() {
        let raw = [
            RawDetection::new(0, 0.9),
            RawDetection::new(3, 0.5),
            RawDetection::new(3, 0.51),
            RawDetection::new(7, 0.99),
            RawDetection::new(2, f32::NAN),
        ];
        let events: Vec<_> = normalize(&raw, Utc::now()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].class, DetectionClass::ClosedEyes);
        assert_eq!(events[1].class, DetectionClass::OpenMouth);
    }
}
