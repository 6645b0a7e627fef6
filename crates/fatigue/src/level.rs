//! Fatigue levels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fatigue level.
///
/// One superset of the labels used by the classification policies:
/// - [`RatePerSecond`](crate::ClassificationPolicy::RatePerSecond): `None`, `Mild`,
///   `Moderate`, `Severe`
/// - [`WindowCount`](crate::ClassificationPolicy::WindowCount) and
///   [`SingleImage`](crate::ClassificationPolicy::SingleImage): `Low`, `Medium`, `High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatigueLevel {
    #[default]
    None,
    Low,
    Mild,
    Medium,
    Moderate,
    High,
    Severe,
}

impl FatigueLevel {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FatigueLevel::None => "none",
            FatigueLevel::Low => "low",
            FatigueLevel::Mild => "mild",
            FatigueLevel::Medium => "medium",
            FatigueLevel::Moderate => "moderate",
            FatigueLevel::High => "high",
            FatigueLevel::Severe => "severe",
        }
    }

    /// Label shown to operators
    pub fn display_text(&self) -> &'static str {
        match self {
            FatigueLevel::None => "No Fatigue",
            FatigueLevel::Low => "Low Fatigue",
            FatigueLevel::Mild => "Mild Fatigue",
            FatigueLevel::Medium => "Medium Fatigue",
            FatigueLevel::Moderate => "Moderate Fatigue",
            FatigueLevel::High => "High Fatigue",
            FatigueLevel::Severe => "Severe Fatigue",
        }
    }

    /// Levels that warrant a driver warning
    pub fn is_alarming(&self) -> bool {
        matches!(self, FatigueLevel::High | FatigueLevel::Severe)
    }

    /// Parse a stored label
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" => Some(FatigueLevel::None),
            "low" => Some(FatigueLevel::Low),
            "mild" => Some(FatigueLevel::Mild),
            "medium" => Some(FatigueLevel::Medium),
            "moderate" => Some(FatigueLevel::Moderate),
            "high" => Some(FatigueLevel::High),
            "severe" => Some(FatigueLevel::Severe),
            _ => None,
        }
    }
}

impl fmt::Display for FatigueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
