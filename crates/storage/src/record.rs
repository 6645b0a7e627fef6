//! Detection record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the frames of a record were captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordMethod {
    Image,
    Video,
    Camera,
}

impl RecordMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordMethod::Image => "image",
            RecordMethod::Video => "video",
            RecordMethod::Camera => "camera",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "image" => Some(RecordMethod::Image),
            "video" => Some(RecordMethod::Video),
            "camera" => Some(RecordMethod::Camera),
            _ => None,
        }
    }
}

impl fmt::Display for RecordMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw totals and derived rates of one persisted session segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDetails {
    pub session_id: String,
    /// Elapsed session time, one decimal
    pub total_seconds: f64,
    pub closed_eyes_count: u64,
    pub closed_mouth_count: u64,
    pub open_eyes_count: u64,
    pub open_mouth_count: u64,
    pub total_detections: u64,
    pub total_frames: u64,
    /// Closed eyes per second, two decimals
    pub closed_eyes_per_sec: f64,
    /// Open mouth per second, two decimals
    pub open_mouth_per_sec: f64,
}

impl RecordDetails {
    /// Round the time and rate fields to their stored precision
    pub fn rounded(mut self) -> Self {
        self.total_seconds = round_to(self.total_seconds, 1);
        self.closed_eyes_per_sec = round_to(self.closed_eyes_per_sec, 2);
        self.open_mouth_per_sec = round_to(self.open_mouth_per_sec, 2);
        self
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// One finished detection session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Assigned by the sink; 0 until persisted
    pub id: i64,
    pub username: String,
    pub method: RecordMethod,
    pub result: String,
    pub fatigue_level: String,
    pub status: String,
    pub details: RecordDetails,
    pub confidence: f64,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl DetectionRecord {
    /// A completed record, not yet persisted
    pub fn completed(
        username: impl Into<String>,
        method: RecordMethod,
        fatigue_level: impl Into<String>,
        details: RecordDetails,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let details = details.rounded();
        Self {
            id: 0,
            username: username.into(),
            method,
            result: "completed".to_string(),
            fatigue_level: fatigue_level.into(),
            status: "completed".to_string(),
            duration_seconds: details.total_seconds,
            details,
            confidence,
            timestamp,
        }
    }
}
