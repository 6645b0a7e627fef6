//! Frame Capture Library for Fatigue Detection
//!
//! Provides the decoded frame type shared by the detector and the session
//! workers, plus the frame sources a detection stream can read from:
//! - Image sequences on disk (offline video clips exported frame by frame)
//! - In-memory frame queues (pushed camera frames, tests)
//! - Video clips and capture devices via OpenCV (`video` feature)

pub mod frame;
pub mod source;
pub mod video;

pub use frame::VideoFrame;
pub use source::{FrameSource, ImageSequenceSource, MemorySource};
pub use video::{is_video_file, open_device, open_path};

#[cfg(feature = "video")]
pub use video::VideoCaptureSource;

use thiserror::Error;

/// Frame rate assumed when a source does not report a usable one
pub const DEFAULT_FPS: f64 = 25.0;

/// Camera / frame source error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),
}

impl CameraError {
    /// Whether the error only affects the current frame (the stream may continue)
    pub fn is_frame_local(&self) -> bool {
        matches!(self, CameraError::Decode(_))
    }
}

/// Clamp a reported frame rate to something usable.
///
/// Sources that report nothing, or a rate outside 1..=240, fall back to
/// [`DEFAULT_FPS`].
pub fn effective_fps(reported: Option<f64>) -> f64 {
    match reported {
        Some(fps) if fps.is_finite() && (1.0..=240.0).contains(&fps) => fps,
        _ => DEFAULT_FPS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_fps() {
        assert_eq!(effective_fps(Some(30.0)), 30.0);
        assert_eq!(effective_fps(None), DEFAULT_FPS);
        assert_eq!(effective_fps(Some(0.0)), DEFAULT_FPS);
        assert_eq!(effective_fps(Some(1000.0)), DEFAULT_FPS);
        assert_eq!(effective_fps(Some(f64::NAN)), DEFAULT_FPS);
    }

    #[test]
    fn test_decode_errors_are_frame_local() {
        assert!(CameraError::Decode("bad jpeg".into()).is_frame_local());
        assert!(!CameraError::Open("/dev/null".into()).is_frame_local());
    }
}
