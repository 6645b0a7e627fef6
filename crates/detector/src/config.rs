//! Detector configuration

use serde::{Deserialize, Serialize};

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Directories searched (in order) for model files
    pub model_dirs: Vec<String>,

    /// Model used when a request does not name one
    pub default_model: String,

    /// Square model input size (pixels)
    pub input_size: u32,

    /// IoU above which overlapping boxes of the same class are suppressed
    pub iou_threshold: f32,

    /// Raw score below which candidate boxes are dropped before NMS
    pub score_floor: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_dirs: vec!["models/uploads".to_string(), "models".to_string(), ".".to_string()],
            default_model: "best.onnx".to_string(),
            input_size: 640,
            iou_threshold: 0.45,
            score_floor: 0.25,
        }
    }
}
