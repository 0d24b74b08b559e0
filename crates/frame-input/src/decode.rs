//! Base64 image payload decoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::{FrameError, VideoFrame};

/// Remove a `data:image/...;base64,` prefix if present
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, body)) => body,
        None => payload,
    }
}

/// Decode a base64 (or data URI) encoded still image into an RGB frame
pub fn decode_base64_frame(payload: &str) -> Result<VideoFrame, FrameError> {
    let body = strip_data_uri(payload.trim()).trim();
    if body.is_empty() {
        return Err(FrameError::Empty);
    }

    // MIME-style payloads wrap lines
    let body: String = body.split_ascii_whitespace().collect();
    let bytes = STANDARD.decode(body)?;
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }

    let image = image::load_from_memory(&bytes)?;
    let rgb = image.to_rgb8();
    debug!("Decoded {}x{} frame ({} bytes)", rgb.width(), rgb.height(), bytes.len());

    Ok(VideoFrame::from_rgb_image(rgb))
}
