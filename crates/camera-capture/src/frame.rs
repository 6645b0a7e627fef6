//! Video frame types and processing

use crate::CameraError;
use image::RgbImage;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since stream start)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Solid-color frame, mostly useful for tests and warm-up runs
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u32) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, sequence)
    }

    /// Decode an encoded image (JPEG, PNG, BMP) into an RGB frame
    pub fn decode(bytes: &[u8], sequence: u32) -> Result<Self, CameraError> {
        let img = image::load_from_memory(bytes).map_err(|e| CameraError::Decode(e.to_string()))?;
        Ok(Self::from_rgb_image(img.to_rgb8(), sequence))
    }

    /// Wrap an already decoded RGB image
    pub fn from_rgb_image(img: RgbImage, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, 0, sequence)
    }

    /// Borrow the frame as an `image` buffer
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "buffer of {} bytes does not match {}x{} RGB",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let frame = VideoFrame::decode(&encoded_png(8, 4), 7).unwrap();
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 4);
        assert_eq!(frame.sequence, 7);
        assert_eq!(&frame.data[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = VideoFrame::decode(b"definitely not an image", 0).unwrap_err();
        assert!(err.is_frame_local());
    }

    #[test]
    fn test_mismatched_buffer() {
        let frame = VideoFrame::new(vec![0; 5], 2, 2, 0, 0);
        assert!(frame.to_rgb_image().is_err());
    }
}
