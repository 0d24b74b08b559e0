//! DMS configuration

use serde::{Deserialize, Serialize};

/// How palm-hold sessions are scoped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureScope {
    /// One session for the whole process; a new trip takes over the timer
    #[default]
    Shared,
    /// One session per trip identifier
    PerTrip,
}

/// Where distribution `opencv-data` packages install the stock Haar cascades
pub const OPENCV_HAARCASCADE_DIR: &str = "/usr/share/opencv4/haarcascades";

/// Multi-scale cascade search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeParams {
    /// OpenCV cascade XML (`.xml`) or JSON cascade definition; a missing
    /// file disables the locator
    pub path: Option<String>,
    /// Window growth factor between scales (must be > 1)
    pub scale_factor: f64,
    /// Overlapping hits needed to keep a detection
    pub min_neighbors: usize,
    /// Smallest window side considered (pixels)
    pub min_size: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            path: None,
            scale_factor: 1.3,
            min_neighbors: 5,
            min_size: 0,
        }
    }
}

/// DMS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// EAR below this indicates eyes closing
    pub ear_threshold: f64,

    /// MAR above this indicates yawning
    pub mar_threshold: f64,

    /// MAR span above threshold mapped to full yawning confidence
    pub mar_confidence_span: f64,

    /// MAR of a closed mouth, origin of the image-mode yawning score
    pub mar_rest: f64,

    /// Head yaw beyond this indicates looking away (degrees)
    pub yaw_threshold_degrees: f64,

    /// Yaw span above threshold mapped to full distraction confidence (degrees)
    pub yaw_confidence_span: f64,

    /// Yaw treated as fully off-road (degrees)
    pub max_yaw_degrees: f64,

    /// Pre-computed eyes-closed score that counts as drowsiness
    pub signal_eyes_closed_threshold: f64,

    /// Pre-computed head-off-road score that counts as distraction
    pub signal_head_off_road_threshold: f64,

    /// Pre-computed yawning score that counts as a fatigue yawn
    pub signal_yawning_threshold: f64,

    /// Open palm hold time before SOS fires (seconds)
    pub sos_hold_secs: f64,

    /// Palm-hold session scoping
    pub gesture_scope: GestureScope,

    /// Face cascade search
    pub face_cascade: CascadeParams,

    /// Eye cascade search (within the face box)
    pub eye_cascade: CascadeParams,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            mar_threshold: 0.6,
            mar_confidence_span: 0.4,
            mar_rest: 0.3,
            yaw_threshold_degrees: 25.0,
            yaw_confidence_span: 20.0,
            max_yaw_degrees: 45.0,
            signal_eyes_closed_threshold: 0.6,
            signal_head_off_road_threshold: 0.5,
            signal_yawning_threshold: 0.55,
            sos_hold_secs: 2.0,
            gesture_scope: GestureScope::Shared,
            face_cascade: CascadeParams {
                path: Some(format!("{OPENCV_HAARCASCADE_DIR}/haarcascade_frontalface_default.xml")),
                ..CascadeParams::default()
            },
            eye_cascade: CascadeParams {
                path: Some(format!("{OPENCV_HAARCASCADE_DIR}/haarcascade_eye.xml")),
                scale_factor: 1.1,
                ..CascadeParams::default()
            },
        }
    }
}

impl DmsConfig {
    /// Create strict config (lower thresholds)
    pub fn strict() -> Self {
        Self {
            ear_threshold: 0.28,
            mar_threshold: 0.55,
            yaw_threshold_degrees: 20.0,
            sos_hold_secs: 1.5,
            ..Default::default()
        }
    }

    /// No cascades: image frames report no face, signals still score
    pub fn signals_only() -> Self {
        Self {
            face_cascade: CascadeParams::default(),
            eye_cascade: CascadeParams::default(),
            ..Default::default()
        }
    }

    /// Create lenient config (higher thresholds)
    pub fn lenient() -> Self {
        Self {
            ear_threshold: 0.22,
            mar_threshold: 0.7,
            yaw_threshold_degrees: 30.0,
            sos_hold_secs: 3.0,
            ..Default::default()
        }
    }
}
