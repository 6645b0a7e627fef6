//! Frame sources feeding detection streams

use crate::{CameraError, VideoFrame};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions accepted by [`ImageSequenceSource`]
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// A finite or open-ended sequence of frames.
///
/// `Ok(None)` marks the end of the stream. Errors for which
/// [`CameraError::is_frame_local`] holds affect only the current frame;
/// any other error ends the stream.
pub trait FrameSource: Send {
    /// Read the next frame
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Frame rate reported by the source, if known
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    /// Human-readable description for logs and record details
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        (**self).next_frame()
    }

    fn frame_rate(&self) -> Option<f64> {
        (**self).frame_rate()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Reads an ordered directory of still images as a video clip
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    fps: Option<f64>,
}

impl ImageSequenceSource {
    /// Open a directory; frames are read in file-name order
    pub fn open(dir: impl AsRef<Path>, fps: Option<f64>) -> Result<Self, CameraError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "{}: no image frames found",
                dir.display()
            )));
        }

        info!("Opened image sequence {} ({} frames)", dir.display(), files.len());

        Ok(Self {
            dir,
            files,
            cursor: 0,
            fps,
        })
    }

    /// Number of frames in the sequence
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the sequence has no frames
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let sequence = self.cursor as u32;
        self.cursor += 1;

        let bytes = std::fs::read(path)
            .map_err(|e| CameraError::Stream(format!("{}: {}", path.display(), e)))?;

        let mut frame = VideoFrame::decode(&bytes, sequence)?;
        let fps = crate::effective_fps(self.fps);
        frame.timestamp_ns = (sequence as f64 / fps * 1e9) as u64;
        debug!("Read frame {} from {}", sequence, path.display());
        Ok(Some(frame))
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// In-memory frame queue
#[derive(Default)]
pub struct MemorySource {
    frames: VecDeque<Result<VideoFrame, CameraError>>,
    fps: Option<f64>,
}

impl MemorySource {
    /// Create a queue from frames
    pub fn new(frames: impl IntoIterator<Item = VideoFrame>, fps: Option<f64>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
            fps,
        }
    }

    /// Queue `count` blank frames
    pub fn blank(count: usize, fps: Option<f64>) -> Self {
        Self::new((0..count).map(|i| VideoFrame::filled(32, 32, [0, 0, 0], i as u32)), fps)
    }

    /// Append a frame
    pub fn push(&mut self, frame: VideoFrame) {
        self.frames.push_back(Ok(frame));
    }

    /// Append an error in place of a frame
    pub fn push_error(&mut self, error: CameraError) {
        self.frames.push_back(Err(error));
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        match self.frames.pop_front() {
            Some(item) => item.map(Some),
            None => Ok(None),
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("camera-capture-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_memory_source_drains_in_order() {
        let mut source = MemorySource::blank(3, Some(30.0));
        assert_eq!(source.frame_rate(), Some(30.0));
        for expected in 0..3 {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.sequence, expected);
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_memory_source_errors() {
        let mut source = MemorySource::blank(1, None);
        source.push_error(CameraError::Decode("corrupt".into()));
        source.push(VideoFrame::filled(4, 4, [1, 2, 3], 9));

        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap_err().is_frame_local());
        assert_eq!(source.next_frame().unwrap().unwrap().sequence, 9);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_sorted_and_filtered() {
        let dir = temp_dir("sequence");
        for name in ["b.png", "a.png"] {
            RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]))
                .save_with_format(dir.join(name), ImageFormat::Png)
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();
        std::fs::write(dir.join("c.jpg"), b"broken").unwrap();

        let mut source = ImageSequenceSource::open(&dir, Some(10.0)).unwrap();
        assert_eq!(source.len(), 3);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.sequence, 0);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.timestamp_ns, 100_000_000);
        assert!(source.next_frame().unwrap_err().is_frame_local());
        assert!(source.next_frame().unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_image_sequence_empty_dir() {
        let dir = temp_dir("empty");
        assert!(matches!(
            ImageSequenceSource::open(&dir, None),
            Err(CameraError::Open(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
