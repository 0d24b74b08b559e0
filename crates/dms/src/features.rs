//! Eye, mouth and head-pose indicators from a single frame

use frame_input::VideoFrame;
use image::imageops;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detector::{CascadeLocator, ObjectLocator, Rect};
use crate::{round_to, DmsConfig, DmsError};

/// EAR reported when the eyes cannot be measured
pub const DEFAULT_EAR: f64 = 0.3;

/// MAR reported when the mouth region cannot be measured
pub const DEFAULT_MAR: f64 = 0.3;

/// Per-frame driver indicators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    pub face_detected: bool,
    /// Eye aspect ratio proxy (lower = more closed)
    pub ear: f64,
    /// Mouth aspect ratio proxy (higher = more open)
    pub mar: f64,
    /// Head yaw proxy in degrees, positive towards increasing x
    pub yaw_angle: f64,
    /// Eye regions found inside the face box
    pub eyes_detected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_box: Option<Rect>,
}

impl FrameFeatures {
    pub fn no_face() -> Self {
        Self::default()
    }

    /// Display copy: EAR/MAR to 3 decimals, yaw to 2
    pub fn rounded(&self) -> Self {
        Self {
            ear: round_to(self.ear, 3),
            mar: round_to(self.mar, 3),
            yaw_angle: round_to(self.yaw_angle, 2),
            ..self.clone()
        }
    }
}

/// Turns decoded frames into `FrameFeatures`
pub struct FeatureExtractor {
    face_locator: Option<Box<dyn ObjectLocator>>,
    eye_locator: Option<Box<dyn ObjectLocator>>,
}

impl FeatureExtractor {
    /// Load the configured face and eye cascades
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let face_locator = CascadeLocator::from_params(&config.face_cascade)?;
        if face_locator.is_none() {
            warn!("No face cascade available. Every frame will report no face.");
        }
        let eye_locator = CascadeLocator::from_params(&config.eye_cascade)?;
        if eye_locator.is_none() {
            warn!("No eye cascade available. EAR falls back to {}.", DEFAULT_EAR);
        }

        Ok(Self {
            face_locator: face_locator.map(|l| Box::new(l) as Box<dyn ObjectLocator>),
            eye_locator: eye_locator.map(|l| Box::new(l) as Box<dyn ObjectLocator>),
        })
    }

    /// Build from arbitrary locators
    pub fn with_locators(
        face_locator: Box<dyn ObjectLocator>,
        eye_locator: Option<Box<dyn ObjectLocator>>,
    ) -> Self {
        Self {
            face_locator: Some(face_locator),
            eye_locator,
        }
    }

    pub fn has_face_locator(&self) -> bool {
        self.face_locator.is_some()
    }

    /// Extract indicators from an RGB frame
    pub fn extract(&self, frame: &VideoFrame) -> FrameFeatures {
        if frame.is_empty() {
            return FrameFeatures::no_face();
        }
        self.extract_gray(&frame.to_grayscale())
    }

    /// Extract indicators from a grayscale frame
    pub fn extract_gray(&self, gray: &GrayImage) -> FrameFeatures {
        let (width, height) = gray.dimensions();
        let Some(face_locator) = &self.face_locator else {
            return FrameFeatures::no_face();
        };

        let Some(face) = face_locator
            .locate(gray)
            .into_iter()
            .find_map(|r| r.clip(width, height))
        else {
            debug!("No face in {}x{} frame", width, height);
            return FrameFeatures::no_face();
        };

        let face_gray = imageops::crop_imm(gray, face.x, face.y, face.width, face.height).to_image();
        let eyes = self
            .eye_locator
            .as_ref()
            .map(|l| l.locate(&face_gray))
            .unwrap_or_default();

        let features = FrameFeatures {
            face_detected: true,
            ear: estimate_ear(&face_gray, &eyes),
            mar: estimate_mar(&face_gray),
            yaw_angle: estimate_head_yaw(&face, width),
            eyes_detected: eyes.len(),
            face_box: Some(face),
        };
        debug!(
            "Face at {:?}: ear={:.3} mar={:.3} yaw={:.2}",
            face, features.ear, features.mar, features.yaw_angle
        );
        features
    }
}

/// Mean intensity of each row in `region`
fn row_mean_profile(image: &GrayImage, region: Rect) -> Vec<f64> {
    (region.y..region.y + region.height)
        .map(|y| {
            let total: u64 = (region.x..region.x + region.width)
                .map(|x| image.get_pixel(x, y)[0] as u64)
                .sum();
            total as f64 / region.width as f64
        })
        .collect()
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// EAR proxy from the row-intensity variance of each eye region.
/// Open eyes show more vertical contrast (lid, iris, lid) than closed ones.
pub fn estimate_ear(face_gray: &GrayImage, eyes: &[Rect]) -> f64 {
    if eyes.len() < 2 {
        return DEFAULT_EAR;
    }

    let (width, height) = face_gray.dimensions();
    let estimates: Vec<f64> = eyes
        .iter()
        .filter_map(|eye| eye.clip(width, height))
        .map(|eye| {
            let profile = row_mean_profile(face_gray, eye);
            (variance(&profile) / 1000.0 + 0.15).clamp(0.10, 0.35)
        })
        .collect();

    if estimates.is_empty() {
        return DEFAULT_EAR;
    }
    estimates.iter().sum::<f64>() / estimates.len() as f64
}

/// MAR proxy from the intensity range across rows of the lower 40% of the face
pub fn estimate_mar(face_gray: &GrayImage) -> f64 {
    let (width, height) = face_gray.dimensions();
    let mouth_top = (height as f64 * 0.6) as u32;
    if width == 0 || mouth_top >= height {
        return DEFAULT_MAR;
    }

    let profile = row_mean_profile(face_gray, Rect::new(0, mouth_top, width, height - mouth_top));
    if profile.len() < 3 {
        return DEFAULT_MAR;
    }

    let max = profile.iter().cloned().fold(f64::MIN, f64::max);
    let min = profile.iter().cloned().fold(f64::MAX, f64::min);
    ((max - min) / 100.0).clamp(0.2, 1.0)
}

/// Yaw proxy from the horizontal offset of the face centre
pub fn estimate_head_yaw(face: &Rect, image_width: u32) -> f64 {
    if image_width == 0 {
        return 0.0;
    }
    let half_width = image_width as f64 / 2.0;
    (face.center_x() - half_width) / half_width * 45.0
}
