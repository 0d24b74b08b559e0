//! Video frame types and processing

use image::{GrayImage, Luma, RgbImage};

use crate::FrameError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                len: data.len(),
                width,
                height,
            });
        }
        Ok(Self { data, width, height })
    }

    /// Take ownership of an `image` RGB buffer
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    /// Frame has no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let idx = ((y * self.width + x) * 3) as usize;
            let pixel = &self.data[idx..idx + 3];
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let luma = pixel[0] as f32 * 0.299 + pixel[1] as f32 * 0.587 + pixel[2] as f32 * 0.114;
            Luma([luma.round().min(255.0) as u8])
        })
    }

    /// Borrow the frame as an `image` RGB buffer (copies the pixels)
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}
