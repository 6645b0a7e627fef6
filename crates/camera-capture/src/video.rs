//! Video clips and capture devices
//!
//! Clips (mp4, avi, mov, mkv) and camera devices are decoded through OpenCV
//! when the `video` feature is enabled. Without it, opening either fails
//! with [`CameraError::Open`]; frame directories always work.

use crate::{CameraError, FrameSource, ImageSequenceSource};
use std::path::Path;

#[cfg(feature = "video")]
pub use capture::VideoCaptureSource;

/// Extensions treated as encoded video clips
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Whether `path` names a video clip by extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Open a frame source for `path`.
///
/// Directories are read as image sequences and video files are decoded.
/// `fps` overrides the rate the source reports.
pub fn open_path(
    path: impl AsRef<Path>,
    fps: Option<f64>,
) -> Result<Box<dyn FrameSource>, CameraError> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path, fps)?));
    }
    if !path.exists() {
        return Err(CameraError::Open(format!("{}: no such file or directory", path.display())));
    }
    if is_video_file(path) {
        return open_video_file(path, fps);
    }
    Err(CameraError::Open(format!(
        "{}: not a frame directory or video file",
        path.display()
    )))
}

/// Open camera device `index` (0 is the default camera)
#[cfg(feature = "video")]
pub fn open_device(index: i32, fps: Option<f64>) -> Result<Box<dyn FrameSource>, CameraError> {
    Ok(Box::new(VideoCaptureSource::device(index, fps)?))
}

#[cfg(not(feature = "video"))]
pub fn open_device(index: i32, _fps: Option<f64>) -> Result<Box<dyn FrameSource>, CameraError> {
    Err(CameraError::Open(format!(
        "camera {}: capture devices need the `video` feature",
        index
    )))
}

#[cfg(feature = "video")]
fn open_video_file(path: &Path, fps: Option<f64>) -> Result<Box<dyn FrameSource>, CameraError> {
    Ok(Box::new(VideoCaptureSource::file(path, fps)?))
}

#[cfg(not(feature = "video"))]
fn open_video_file(path: &Path, _fps: Option<f64>) -> Result<Box<dyn FrameSource>, CameraError> {
    Err(CameraError::Open(format!(
        "{}: video decoding needs the `video` feature",
        path.display()
    )))
}

#[cfg(feature = "video")]
mod capture {
    use crate::{effective_fps, CameraError, FrameSource, VideoFrame};
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture},
    };
    use std::path::Path;
    use tracing::{debug, info};

    /// Frames from an OpenCV capture (clip or device), converted to RGB
    pub struct VideoCaptureSource {
        cap: VideoCapture,
        label: String,
        fps: Option<f64>,
        sequence: u32,
    }

    impl VideoCaptureSource {
        /// Open a video clip
        pub fn file(path: &Path, fps: Option<f64>) -> Result<Self, CameraError> {
            let label = path.display().to_string();
            let name = path
                .to_str()
                .ok_or_else(|| CameraError::Open(format!("{}: path is not valid UTF-8", label)))?;
            let cap = VideoCapture::from_file(name, videoio::CAP_ANY)
                .map_err(|e| CameraError::Open(format!("{}: {}", label, e)))?;
            Self::from_capture(cap, label, fps)
        }

        /// Open a capture device
        pub fn device(index: i32, fps: Option<f64>) -> Result<Self, CameraError> {
            let label = format!("camera {}", index);
            let cap = VideoCapture::new(index, videoio::CAP_ANY)
                .map_err(|e| CameraError::Open(format!("{}: {}", label, e)))?;
            Self::from_capture(cap, label, fps)
        }

        fn from_capture(
            cap: VideoCapture,
            label: String,
            fps: Option<f64>,
        ) -> Result<Self, CameraError> {
            let opened = cap
                .is_opened()
                .map_err(|e| CameraError::Open(format!("{}: {}", label, e)))?;
            if !opened {
                return Err(CameraError::Open(format!("{}: could not be opened", label)));
            }

            let reported = cap
                .get(videoio::CAP_PROP_FPS)
                .ok()
                .filter(|rate| *rate > 0.0);
            info!("Opened {} (reported fps: {:?})", label, reported);

            Ok(Self {
                cap,
                label,
                fps: fps.or(reported),
                sequence: 0,
            })
        }
    }

    impl FrameSource for VideoCaptureSource {
        fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            let mut bgr = Mat::default();
            let read = self
                .cap
                .read(&mut bgr)
                .map_err(|e| CameraError::Stream(format!("{}: {}", self.label, e)))?;
            if !read || bgr.empty() {
                debug!("{} ended after {} frames", self.label, self.sequence);
                return Ok(None);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
                .map_err(|e| CameraError::Decode(e.to_string()))?;
            let data = rgb
                .data_bytes()
                .map_err(|e| CameraError::Decode(e.to_string()))?
                .to_vec();

            let sequence = self.sequence;
            self.sequence += 1;
            let timestamp_ns = (sequence as f64 / effective_fps(self.fps) * 1e9) as u64;
            Ok(Some(VideoFrame::new(
                data,
                rgb.cols() as u32,
                rgb.rows() as u32,
                timestamp_ns,
                sequence,
            )))
        }

        fn frame_rate(&self) -> Option<f64> {
            self.fps
        }

        fn describe(&self) -> String {
            self.label.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("camera-video-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_video_extensions() {
        assert!(is_video_file(Path::new("clips/drive.MP4")));
        assert!(is_video_file(Path::new("night.mkv")));
        assert!(!is_video_file(Path::new("frame_001.png")));
        assert!(!is_video_file(Path::new("README")));
    }

    #[test]
    fn test_open_path_reads_frame_directory() {
        let dir = temp_dir("frames");
        RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]))
            .save_with_format(dir.join("000.png"), ImageFormat::Png)
            .unwrap();

        let mut source = open_path(&dir, Some(12.0)).unwrap();
        assert_eq!(source.frame_rate(), Some(12.0));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_open_path_rejects_missing_and_unknown() {
        let dir = temp_dir("unknown");
        assert!(matches!(
            open_path(dir.join("missing.mp4"), None),
            Err(CameraError::Open(_))
        ));

        let notes = dir.join("notes.txt");
        std::fs::write(&notes, b"not a clip").unwrap();
        assert!(matches!(open_path(&notes, None), Err(CameraError::Open(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(not(feature = "video"))]
    #[test]
    fn test_clips_need_video_feature() {
        let dir = temp_dir("clip");
        let clip = dir.join("drive.mp4");
        std::fs::write(&clip, b"\x00\x00\x00\x18ftypmp42").unwrap();

        let err = open_path(&clip, None).err().unwrap();
        assert!(err.to_string().contains("video"));
        assert!(matches!(open_device(0, None), Err(CameraError::Open(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(feature = "video")]
    #[test]
    fn test_corrupt_clip_fails_to_open() {
        let dir = temp_dir("corrupt");
        let clip = dir.join("broken.avi");
        std::fs::write(&clip, b"garbage").unwrap();

        assert!(matches!(open_path(&clip, None), Err(CameraError::Open(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
