//! Detection modalities

use crate::level::FatigueLevel;
use serde::{Deserialize, Serialize};

/// Where a session's frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// One-shot image job
    Image,
    /// Offline video clip
    Video,
    /// Live camera stream
    Camera,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Video => "video",
            Modality::Camera => "camera",
        }
    }

    /// Level reported for a session that does not exist (yet)
    pub fn absent_level(&self) -> FatigueLevel {
        match self {
            Modality::Camera => FatigueLevel::None,
            Modality::Video | Modality::Image => FatigueLevel::Low,
        }
    }
}
