//! Video frame types and processing

use image::{GrayImage, ImageBuffer, Rgb, RgbImage};

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
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

    /// Create a frame from a decoded RGB image
    pub fn from_rgb_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Check that the buffer matches the declared dimensions
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Format(format!(
                "degenerate frame {}x{}",
                self.width, self.height
            )));
        }

        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| CameraError::Format("frame dimensions overflow".into()))?;

        if self.data.len() != expected {
            return Err(CameraError::Format(format!(
                "expected {} RGB bytes for {}x{}, got {}",
                expected,
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        let px = self.data.get(idx..idx + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Borrow the frame as an RGB image view
    pub fn as_rgb_image(&self) -> Result<ImageBuffer<Rgb<u8>, &[u8]>, CameraError> {
        self.validate()?;
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
            .ok_or_else(|| CameraError::Format("failed to wrap RGB buffer".into()))
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> Result<GrayImage, CameraError> {
        self.validate()?;
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B, rounded
            let y = (pixel[0] as f32 * 0.299
                   + pixel[1] as f32 * 0.587
                   + pixel[2] as f32 * 0.114)
                .round()
                .clamp(0.0, 255.0) as u8;
            gray.push(y);
        }
        GrayImage::from_raw(self.width, self.height, gray)
            .ok_or_else(|| CameraError::Format("failed to build grayscale image".into()))
    }

    /// Grayscale + histogram equalization, the input expected by eye detectors
    pub fn to_detector_input(&self) -> Result<GrayImage, CameraError> {
        let gray = self.to_grayscale()?;
        Ok(imageproc::contrast::equalize_histogram(&gray))
    }

    /// Crop a region of the frame
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<VideoFrame> {
        if w == 0 || h == 0 {
            return None;
        }
        if x.checked_add(w)? > self.width || y.checked_add(h)? > self.height {
            return None;
        }

        let mut cropped = Vec::with_capacity((w * h * 3) as usize);
        for row in y..(y + h) {
            let start = ((row * self.width + x) * 3) as usize;
            let end = start + (w * 3) as usize;
            cropped.extend_from_slice(self.data.get(start..end)?);
        }

        Some(VideoFrame {
            data: cropped,
            width: w,
            height: h,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }
}
