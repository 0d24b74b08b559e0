//! Frame Input Library for Driver Risk Analysis
//!
//! Turns the image field of an analysis request into a decoded frame:
//! - Base64 payloads, optionally `data:` URI prefixed
//! - Any still-image format supported by the `image` crate
//! - RGB frame buffer with grayscale conversion for the detectors

pub mod decode;
pub mod frame;

pub use decode::{decode_base64_frame, strip_data_uri};
pub use frame::VideoFrame;

use thiserror::Error;

/// Frame decoding error types
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Empty image payload")]
    Empty,

    #[error("Invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Buffer size {len} does not match {width}x{height} RGB frame")]
    BufferSize { len: usize, width: u32, height: u32 },
}
