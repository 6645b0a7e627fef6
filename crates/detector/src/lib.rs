//! Fatigue Frame Classifier
//!
//! Adapter over the eye/mouth state detection model:
//! - Class mapping (0 closed eyes, 1 closed mouth, 2 open eyes, 3 open mouth)
//! - Fixed confidence filtering into normalized detection events
//! - YOLO ONNX inference via tract
//! - Model lookup and caching

pub mod class;
pub mod classifier;
pub mod config;
pub mod registry;
pub mod yolo;

pub use class::{normalize, DetectionClass, DetectionEvent, RawDetection, MIN_CONFIDENCE};
pub use classifier::{FrameClassifier, MockClassifier, MockResponse};
pub use config::DetectorConfig;
pub use registry::{ModelInfo, ModelRegistry};
pub use yolo::YoloOnnxClassifier;

use thiserror::Error;

/// Detector error types
#[derive(Error, Debug)]
pub enum DetectError {
    /// No model loaded; no detection possible
    #[error("Detection model unavailable")]
    ModelUnavailable,

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// Per-frame decode or inference failure
    #[error("Detection failed: {0}")]
    Detection(String),
}

impl DetectError {
    /// Whether the failure only concerns the current frame
    pub fn is_frame_local(&self) -> bool {
        matches!(self, DetectError::Detection(_))
    }
}
