//! Fatigue Session Lifecycle
//!
//! Ties the detector, the fatigue policies and the record sink together:
//! - Per-session accumulation behind a concurrency-safe store
//! - Live camera and offline video stream workers
//! - Debounced status evaluation with driver alerts
//! - Exactly-once persistence on stop, reset and job completion

pub mod clock;
pub mod config;
pub mod manager;
pub mod service;
pub mod store;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use manager::SessionManager;
pub use service::{
    FatigueService, FrameOutcome, SessionStatus, SingleImageReport, StreamStarted, VideoPolicy,
    VideoReport,
};
pub use store::{camera_session_id, SessionOrigin};
pub use worker::{StopReason, WorkerSummary};

use thiserror::Error;

/// Counter of frames that went through the detector
pub const FRAMES_PROCESSED_TOTAL: &str = "frames_processed_total";
/// Counter of frames skipped after a decode or detection failure
pub const FRAMES_SKIPPED_TOTAL: &str = "frames_skipped_total";
/// Counter of persisted detection records
pub const DETECTION_RECORDS_TOTAL: &str = "detection_records_total";
/// Gauge of sessions currently held in memory
pub const ACTIVE_SESSIONS: &str = "active_sessions";

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    metrics::describe_counter!(FRAMES_PROCESSED_TOTAL, "Frames run through the detector");
    metrics::describe_counter!(FRAMES_SKIPPED_TOTAL, "Frames skipped after a per-frame failure");
    metrics::describe_counter!(DETECTION_RECORDS_TOTAL, "Detection records persisted");
    metrics::describe_gauge!(ACTIVE_SESSIONS, "Sessions currently held in memory");
}

/// Session lifecycle error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Detection unavailable: no model loaded")]
    ModelUnavailable,

    #[error("A stream is already running for session {0}")]
    StreamActive(String),

    #[error("Frame source error: {0}")]
    Source(#[from] camera_capture::CameraError),

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<detector::DetectError> for SessionError {
    fn from(err: detector::DetectError) -> Self {
        match err {
            detector::DetectError::ModelUnavailable => SessionError::ModelUnavailable,
            other => SessionError::Detection(other.to_string()),
        }
    }
}
