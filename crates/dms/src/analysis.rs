//! Detections and normalized raw scores

use serde::{Deserialize, Serialize};

use crate::features::FrameFeatures;
use crate::gesture::SosGesture;
use crate::{round_to, DmsConfig};

/// Source tag for detections computed from frame heuristics
pub const IMAGE_SOURCE: &str = "haar_cascade";

/// Source tag for detections built from caller-supplied scores
pub const SIGNAL_SOURCE: &str = "ai_engine";

/// Detection types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    /// Eyes closing
    Drowsiness,
    /// Wide open mouth (image mode)
    Yawning,
    /// Head turned away from the road
    Distraction,
    /// Yawning reported by an external detector
    FatigueYawn,
}

/// One behavioural detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "type")]
    pub kind: DetectionKind,
    /// Confidence in [0, 1], 3 decimals
    pub confidence: f64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Detection {
    fn from_image(kind: DetectionKind, confidence: f64, metric: &str, value: f64) -> Self {
        Self {
            kind,
            confidence: round_to(confidence.clamp(0.0, 1.0), 3),
            source: IMAGE_SOURCE.to_string(),
            metric: Some(metric.to_string()),
            value: Some(value),
        }
    }

    fn from_signal(kind: DetectionKind, score: f64) -> Self {
        Self {
            kind,
            confidence: round_to(score.clamp(0.0, 1.0), 3),
            source: SIGNAL_SOURCE.to_string(),
            metric: None,
            value: None,
        }
    }
}

/// Normalized per-frame scores, comparable across input modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScores {
    pub eyes_closed_score: f64,
    pub head_off_road_score: f64,
    pub yawning_score: f64,
}

impl RawScores {
    /// Build from arbitrary values, clamping each into [0, 1]
    pub fn new(eyes_closed: f64, head_off_road: f64, yawning: f64) -> Self {
        Self {
            eyes_closed_score: unit(eyes_closed),
            head_off_road_score: unit(head_off_road),
            yawning_score: unit(yawning),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Detections plus the raw scores that feed risk scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutcome {
    pub detections: Vec<Detection>,
    pub raw_scores: RawScores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DetectionOutcome {
    /// Nothing could be evaluated; all scores zero
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            detections: Vec::new(),
            raw_scores: RawScores::zero(),
            message: Some(message.into()),
        }
    }

    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }

    pub fn contains(&self, kind: DetectionKind) -> bool {
        self.detections.iter().any(|d| d.kind == kind)
    }
}

/// Complete image-mode analysis result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    pub features: FrameFeatures,
    pub outcome: DetectionOutcome,
    pub sos_gesture: SosGesture,
}

/// Threshold-based classifier for both input modes
#[derive(Debug, Clone)]
pub struct DetectionClassifier {
    config: DmsConfig,
}

impl DetectionClassifier {
    pub fn new(config: &DmsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Image mode: threshold the heuristic indicators
    pub fn classify_features(&self, features: &FrameFeatures) -> DetectionOutcome {
        let raw_scores = self.raw_scores(features);
        if !features.face_detected {
            return DetectionOutcome {
                detections: Vec::new(),
                raw_scores,
                message: Some("No face detected".to_string()),
            };
        }

        let cfg = &self.config;
        let ear = features.ear;
        let mar = features.mar;
        let yaw = features.yaw_angle.abs();
        let mut detections = Vec::new();

        if ear < cfg.ear_threshold {
            detections.push(Detection::from_image(
                DetectionKind::Drowsiness,
                1.0 - ear / cfg.ear_threshold,
                "ear",
                ear,
            ));
        }

        if mar > cfg.mar_threshold {
            detections.push(Detection::from_image(
                DetectionKind::Yawning,
                (mar - cfg.mar_threshold) / cfg.mar_confidence_span,
                "mar",
                mar,
            ));
        }

        if yaw > cfg.yaw_threshold_degrees {
            detections.push(Detection::from_image(
                DetectionKind::Distraction,
                (yaw - cfg.yaw_threshold_degrees) / cfg.yaw_confidence_span,
                "yaw_angle",
                yaw,
            ));
        }

        DetectionOutcome {
            detections,
            raw_scores,
            message: None,
        }
    }

    /// Scores derived from the indicators alone, whether or not a face was found
    fn raw_scores(&self, features: &FrameFeatures) -> RawScores {
        let cfg = &self.config;
        let ear = features.ear;
        let eyes_closed = if ear < cfg.ear_threshold { 1.0 - ear } else { 0.0 };
        RawScores::new(
            eyes_closed,
            features.yaw_angle.abs() / cfg.max_yaw_degrees,
            ((features.mar - cfg.mar_rest) / (1.0 - cfg.mar_rest)).max(0.0),
        )
    }

    /// Pre-computed mode: threshold externally supplied scores
    pub fn classify_signals(&self, scores: RawScores) -> DetectionOutcome {
        let cfg = &self.config;
        let mut detections = Vec::new();

        if scores.eyes_closed_score >= cfg.signal_eyes_closed_threshold {
            detections.push(Detection::from_signal(DetectionKind::Drowsiness, scores.eyes_closed_score));
        }
        if scores.head_off_road_score >= cfg.signal_head_off_road_threshold {
            detections.push(Detection::from_signal(DetectionKind::Distraction, scores.head_off_road_score));
        }
        if scores.yawning_score >= cfg.signal_yawning_threshold {
            detections.push(Detection::from_signal(DetectionKind::FatigueYawn, scores.yawning_score));
        }

        DetectionOutcome {
            detections,
            raw_scores: scores,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn face(ear: f64, mar: f64, yaw_angle: f64) -> FrameFeatures {
        FrameFeatures {
            face_detected: true,
            ear,
            mar,
            yaw_angle,
            eyes_detected: 2,
            face_box: None,
        }
    }

    fn classifier() -> DetectionClassifier {
        DetectionClassifier::new(&DmsConfig::default())
    }

    #[test]
    fn test_no_face() {
        let outcome = classifier().classify_features(&FrameFeatures::no_face());
        assert!(outcome.detections.is_empty());
        assert_eq!(outcome.raw_scores, RawScores::new(1.0, 0.0, 0.0));
        assert_eq!(outcome.message.as_deref(), Some("No face detected"));
    }

    #[test]
    fn test_alert_driver() {
        let outcome = classifier().classify_features(&face(0.3, 0.3, 5.0));
        assert!(!outcome.has_detections());
        assert_eq!(outcome.raw_scores.eyes_closed_score, 0.0);
        assert_eq!(outcome.raw_scores.yawning_score, 0.0);
        assert!((outcome.raw_scores.head_off_road_score - 5.0 / 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_image_detections_in_order() {
        let outcome = classifier().classify_features(&face(0.15, 0.8, -35.0));
        let kinds: Vec<_> = outcome.detections.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DetectionKind::Drowsiness, DetectionKind::Yawning, DetectionKind::Distraction]
        );

        assert_eq!(outcome.detections[0].confidence, 0.4);
        assert_eq!(outcome.detections[1].confidence, 0.5);
        assert_eq!(outcome.detections[2].confidence, 0.5);
        assert_eq!(outcome.detections[2].value, Some(35.0));
        assert_eq!(outcome.detections[0].source, IMAGE_SOURCE);

        assert!((outcome.raw_scores.eyes_closed_score - 0.85).abs() < 1e-9);
        assert!((outcome.raw_scores.yawning_score - 0.5 / 0.7).abs() < 1e-9);
        assert!((outcome.raw_scores.head_off_road_score - 35.0 / 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let outcome = classifier().classify_features(&face(0.25, 0.6, 25.0));
        assert!(!outcome.has_detections());
        assert_eq!(outcome.raw_scores.eyes_closed_score, 0.0);
    }

    #[test]
    fn test_confidence_saturates() {
        let outcome = classifier().classify_features(&face(0.3, 1.0, 45.0));
        assert!(outcome.contains(DetectionKind::Yawning));
        assert!(outcome.detections.iter().all(|d| d.confidence == 1.0));
        assert_eq!(outcome.raw_scores.head_off_road_score, 1.0);
        assert_eq!(outcome.raw_scores.yawning_score, 1.0);
    }

    #[test]
    fn test_signal_mode() {
        let outcome = classifier().classify_signals(RawScores::new(0.6, 0.49, 0.9));
        let kinds: Vec<_> = outcome.detections.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DetectionKind::Drowsiness, DetectionKind::FatigueYawn]);
        assert_eq!(outcome.detections[0].source, SIGNAL_SOURCE);
        assert_eq!(outcome.detections[1].confidence, 0.9);
        assert!(outcome.detections[0].metric.is_none());
    }

    #[test]
    fn test_signal_mode_boundaries() {
        let outcome = classifier().classify_signals(RawScores::new(0.59, 0.5, 0.55));
        let kinds: Vec<_> = outcome.detections.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DetectionKind::Distraction, DetectionKind::FatigueYawn]);
    }

    #[test]
    fn test_raw_scores_clamped() {
        let scores = RawScores::new(1.7, -0.2, f64::NAN);
        assert_eq!(scores, RawScores::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_detection_json_shape() {
        let outcome = classifier().classify_signals(RawScores::new(0.0, 0.0, 0.7));
        let json = serde_json::to_value(&outcome.detections[0]).unwrap();
        assert_eq!(json["type"], "fatigue_yawn");
        assert!(json.get("metric").is_none());
    }

    proptest! {
        #[test]
        fn prop_scores_and_confidences_in_unit_range(
            ear in 0.0f64..0.5,
            mar in 0.0f64..1.2,
            yaw in -90.0f64..90.0,
        ) {
            let outcome = classifier().classify_features(&face(ear, mar, yaw));
            for d in &outcome.detections {
                prop_assert!((0.0..=1.0).contains(&d.confidence));
            }
            let s = outcome.raw_scores;
            for v in [s.eyes_closed_score, s.head_off_road_score, s.yawning_score] {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
