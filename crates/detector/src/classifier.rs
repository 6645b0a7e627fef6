//! Frame classifier interface and mock implementation

use crate::class::RawDetection;
use crate::DetectError;
use camera_capture::VideoFrame;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Black-box object detector over one frame.
///
/// Implementations are shared read-only across sessions and streams.
pub trait FrameClassifier: Send + Sync {
    /// Run detection on a frame
    fn classify(&self, frame: &VideoFrame) -> Result<Vec<RawDetection>, DetectError>;

    /// Model name (file name for loaded models)
    fn name(&self) -> &str;
}

impl fmt::Debug for dyn FrameClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameClassifier").field("name", &self.name()).finish()
    }
}

/// Scripted response for [`MockClassifier`]
#[derive(Debug, Clone)]
pub enum MockResponse {
    Detections(Vec<RawDetection>),
    Fail(String),
}

/// Mock classifier for development and tests.
///
/// Scripted responses are served in order; once the script is exhausted
/// every frame gets the fallback detections.
pub struct MockClassifier {
    name: String,
    script: Mutex<VecDeque<MockResponse>>,
    fallback: Vec<RawDetection>,
    available: bool,
}

impl MockClassifier {
    /// Mock that detects nothing
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Vec::new(),
            available: true,
        }
    }

    /// Mock that returns the same detections for every frame
    pub fn constant(detections: Vec<RawDetection>) -> Self {
        Self {
            fallback: detections,
            ..Self::new()
        }
    }

    /// Mock that serves `script` first, then nothing
    pub fn scripted(script: impl IntoIterator<Item = MockResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::new()
        }
    }

    /// Mock with no model loaded
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Set the reported model name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a scripted response
    pub fn push(&self, response: MockResponse) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClassifier for MockClassifier {
    fn classify(&self, frame: &VideoFrame) -> Result<Vec<RawDetection>, DetectError> {
        if !self.available {
            return Err(DetectError::ModelUnavailable);
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(MockResponse::Detections(detections)) => Ok(detections),
            Some(MockResponse::Fail(reason)) => {
                debug!("Mock detection failure on frame {}: {}", frame.sequence, reason);
                Err(DetectError::Detection(reason))
            }
            None => Ok(self.fallback.clone()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> VideoFrame {
        VideoFrame::filled(8, 8, [0, 0, 0], 0)
    }

    #[test]
    fn test_script_then_fallback() {
        let mock = MockClassifier::scripted([
            MockResponse::Detections(vec![RawDetection::new(0, 0.9)]),
            MockResponse::Fail("decode".into()),
        ]);

        assert_eq!(mock.classify(&frame()).unwrap().len(), 1);
        assert!(matches!(mock.classify(&frame()), Err(DetectError::Detection(_))));
        assert!(mock.classify(&frame()).unwrap().is_empty());
    }

    #[test]
    fn test_unavailable() {
        let mock = MockClassifier::unavailable();
        assert!(matches!(mock.classify(&frame()), Err(DetectError::ModelUnavailable)));
    }

    #[test]
    fn test_constant() {
        let mock = MockClassifier::constant(vec![RawDetection::new(3, 0.7)]).with_name("yawn");
        assert_eq!(mock.name(), "yawn");
        for _ in 0..3 {
            assert_eq!(mock.classify(&frame()).unwrap(), vec![RawDetection::new(3, 0.7)]);
        }
    }
}
