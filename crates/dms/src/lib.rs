//! Driver Monitoring System (DMS)
//!
//! Per-frame driver state analysis:
//! - Face localization (boosted Haar-like cascades, OpenCV XML or JSON)
//! - Eye openness (EAR proxy), mouth openness (MAR proxy), head yaw
//! - Drowsiness, yawning and distraction detections
//! - Open-palm SOS gesture with a hold timer

pub mod analysis;
mod cascade_xml;
pub mod config;
pub mod detector;
pub mod features;
pub mod gesture;
pub mod state;

pub use analysis::{DetectionClassifier, DetectionKind, Detection, DetectionOutcome, DmsAnalysis, RawScores};
pub use config::{CascadeParams, DmsConfig, GestureScope, OPENCV_HAARCASCADE_DIR};
pub use detector::{CascadeLocator, HaarCascade, ObjectLocator, Rect};
pub use features::{FeatureExtractor, FrameFeatures};
pub use gesture::{Clock, GestureDetector, HandLandmarker, HandLandmarks, Landmark, ManualClock, SosGesture, SystemClock};

use frame_input::VideoFrame;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Cascade loading failed: {0}")]
    CascadeLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Hand landmark backend failed: {0}")]
    HandLandmarker(String),
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Driver monitoring module
pub struct DmsModule {
    extractor: FeatureExtractor,
    classifier: DetectionClassifier,
    gesture: GestureDetector,
}

impl DmsModule {
    /// Create a new DMS module with configuration
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        Ok(Self {
            extractor: FeatureExtractor::new(&config)?,
            classifier: DetectionClassifier::new(&config),
            gesture: GestureDetector::new(&config),
        })
    }

    /// Assemble from already-built parts
    pub fn from_parts(
        extractor: FeatureExtractor,
        classifier: DetectionClassifier,
        gesture: GestureDetector,
    ) -> Self {
        Self {
            extractor,
            classifier,
            gesture,
        }
    }

    /// Attach a hand landmark backend for SOS detection
    pub fn with_hand_landmarker(mut self, landmarker: Arc<dyn HandLandmarker>) -> Self {
        self.gesture = self.gesture.with_landmarker(landmarker);
        self
    }

    /// Analyze a single decoded frame for `trip`
    pub fn analyze(&self, frame: &VideoFrame, trip: &str) -> DmsAnalysis {
        let features = self.extractor.extract(frame);
        let sos_gesture = self.gesture.detect(frame, trip);
        let outcome = self.classifier.classify_features(&features);

        debug!(
            "Frame analysis for trip '{}': {} detections, palm_open={}",
            trip,
            outcome.detections.len(),
            sos_gesture.palm_open
        );

        DmsAnalysis {
            features,
            outcome,
            sos_gesture,
        }
    }

    /// Classify externally computed scores
    pub fn classify_signals(&self, scores: RawScores) -> DetectionOutcome {
        self.classifier.classify_signals(scores)
    }

    pub fn gesture(&self) -> &GestureDetector {
        &self.gesture
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }
}
