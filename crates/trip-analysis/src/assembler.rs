//! Result records sent to callers and to the trip backend

use chrono::{DateTime, Utc};
use dms::{Detection, FrameFeatures, SosGesture};
use result_sink::CallbackStatus;
use risk_engine::{
    CompositeWeights, RiskAssessment, RiskReason, TemporalLevel, TripCounters, WeightedBreakdown,
    WeightedLevel,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default `metadata.input_type` for frame analysis
pub const FRAME_INPUT_TYPE: &str = "frame";

/// Default `metadata.input_type` for risk-only requests
pub const COMPUTED_INPUT_TYPE: &str = "computed";

/// Source tag of gesture-triggered SOS events
pub const SOS_SOURCE: &str = "ai_engine_hand_gesture";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub input_type: String,
    pub frame_id: Value,
    pub video_id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_metrics: Option<FrameFeatures>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Complete per-frame result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub trip_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub detections: Vec<Detection>,
    pub risk_score_temporal: f64,
    pub risk_level_temporal: TemporalLevel,
    pub risk_score_weighted: f64,
    pub risk_level_weighted: WeightedLevel,
    /// Primary level, same as the weighted level
    pub risk_level: WeightedLevel,
    pub reasons: Vec<RiskReason>,
    pub event_counters: TripCounters,
    pub sos_triggered: bool,
    pub sos_gesture: SosGesture,
    pub weighted_breakdown: WeightedBreakdown,
    pub weights: CompositeWeights,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SosMetadata {
    pub palm_open: bool,
    pub hands_detected: usize,
}

/// Emergency event raised by a held open palm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosEvent {
    pub event_id: Uuid,
    pub trip_id: Option<String>,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub duration: f64,
    pub metadata: SosMetadata,
}

/// `analyze_frame` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub record: AnalysisRecord,
    pub backend_callback: CallbackStatus,
}

/// `compute_risk` response: scores only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskView {
    pub trip_id: Option<String>,
    pub risk_score_temporal: f64,
    pub risk_level_temporal: TemporalLevel,
    pub risk_score_weighted: f64,
    pub risk_level_weighted: WeightedLevel,
    pub risk_level: WeightedLevel,
    pub reasons: Vec<RiskReason>,
    pub event_counters: TripCounters,
    pub weighted_breakdown: WeightedBreakdown,
    pub weights: CompositeWeights,
    pub backend_callback: CallbackStatus,
}

impl RiskView {
    pub fn from_record(record: AnalysisRecord, backend_callback: CallbackStatus) -> Self {
        Self {
            trip_id: record.trip_id,
            risk_score_temporal: record.risk_score_temporal,
            risk_level_temporal: record.risk_level_temporal,
            risk_score_weighted: record.risk_score_weighted,
            risk_level_weighted: record.risk_level_weighted,
            risk_level: record.risk_level,
            reasons: record.reasons,
            event_counters: record.event_counters,
            weighted_breakdown: record.weighted_breakdown,
            weights: record.weights,
            backend_callback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountersView {
    pub trip_id: String,
    pub event_counters: TripCounters,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetAck {
    pub trip_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Final counters of a completed trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_id: String,
    pub final_event_counters: TripCounters,
    pub trip_duration_frames: u64,
    pub completion_timestamp: DateTime<Utc>,
}

impl TripSummary {
    pub fn new(trip_id: &str, counters: TripCounters, now: DateTime<Utc>) -> Self {
        Self {
            trip_id: trip_id.to_string(),
            final_event_counters: counters,
            trip_duration_frames: counters.total_frames_analyzed,
            completion_timestamp: now,
        }
    }

    /// No frames were recorded: unknown or already completed trip
    pub fn is_empty(&self) -> bool {
        self.final_event_counters == TripCounters::default()
    }
}

/// Everything known about one frame before assembly
pub struct FrameParts<'a> {
    pub trip_id: Option<&'a str>,
    pub detections: Vec<Detection>,
    pub assessment: RiskAssessment,
    pub sos_gesture: SosGesture,
    pub cv_metrics: Option<FrameFeatures>,
    pub message: Option<String>,
    pub input_type: String,
    pub frame_id: Value,
    pub video_id: Value,
}

/// Builds result records and SOS events
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(&self, parts: FrameParts<'_>, now: DateTime<Utc>) -> AnalysisRecord {
        let assessment = parts.assessment;
        AnalysisRecord {
            trip_id: parts.trip_id.map(str::to_string),
            timestamp: now,
            detections: parts.detections,
            risk_score_temporal: assessment.temporal_score,
            risk_level_temporal: assessment.temporal_level,
            risk_score_weighted: assessment.weighted_score,
            risk_level_weighted: assessment.weighted_level,
            risk_level: assessment.primary_level(),
            reasons: assessment.reasons,
            event_counters: assessment.counters,
            sos_triggered: parts.sos_gesture.sos_triggered,
            sos_gesture: parts.sos_gesture,
            weighted_breakdown: assessment.weighted_breakdown,
            weights: assessment.weights,
            metadata: RecordMetadata {
                input_type: parts.input_type,
                frame_id: parts.frame_id,
                video_id: parts.video_id,
                cv_metrics: parts.cv_metrics,
                message: parts.message,
            },
        }
    }

    /// SOS event for a record whose gesture fired, sharing its timestamp
    pub fn sos_event(&self, record: &AnalysisRecord) -> Option<SosEvent> {
        if !record.sos_triggered {
            return None;
        }
        Some(SosEvent {
            event_id: Uuid::new_v4(),
            trip_id: record.trip_id.clone(),
            event_type: "SOS".to_string(),
            timestamp: record.timestamp,
            source: SOS_SOURCE.to_string(),
            duration: record.sos_gesture.duration,
            metadata: SosMetadata {
                palm_open: record.sos_gesture.palm_open,
                hands_detected: record.sos_gesture.hands_detected.unwrap_or(0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms::RawScores;
    use risk_engine::RiskScorer;
    use serde_json::json;

    fn parts(sos_gesture: SosGesture) -> FrameParts<'static> {
        let assessment = RiskScorer::default().assess("T1", &RawScores::new(0.9, 0.0, 0.0), 30.0, None);
        FrameParts {
            trip_id: Some("T1"),
            detections: Vec::new(),
            assessment,
            sos_gesture,
            cv_metrics: None,
            message: None,
            input_type: FRAME_INPUT_TYPE.to_string(),
            frame_id: json!(3),
            video_id: Value::Null,
        }
    }

    #[test]
    fn test_record_shape() {
        let now = Utc::now();
        let record = ResultAssembler.assemble(parts(SosGesture::closed()), now);
        assert_eq!(record.risk_level, record.risk_level_weighted);
        assert_eq!(record.timestamp, now);
        assert!(ResultAssembler.sos_event(&record).is_none());

        let json = serde_json::to_value(&record).unwrap();
        for key in [
            "trip_id",
            "timestamp",
            "detections",
            "risk_score_temporal",
            "risk_level_temporal",
            "risk_score_weighted",
            "risk_level_weighted",
            "risk_level",
            "reasons",
            "event_counters",
            "sos_triggered",
            "sos_gesture",
            "weighted_breakdown",
            "weights",
            "metadata",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["metadata"]["input_type"], "frame");
        assert_eq!(json["metadata"]["frame_id"], 3);
        assert!(json["metadata"]["video_id"].is_null());
        assert!(json["metadata"].get("cv_metrics").is_none());
        assert_eq!(json["event_counters"]["drowsiness_events"], 1);
    }

    #[test]
    fn test_sos_event() {
        let gesture = SosGesture {
            sos_detected: true,
            sos_triggered: true,
            palm_open: true,
            duration: 2.4,
            hands_detected: Some(1),
            message: None,
            error: None,
        };
        let record = ResultAssembler.assemble(parts(gesture), Utc::now());
        let event = ResultAssembler.sos_event(&record).unwrap();

        assert_eq!(event.event_type, "SOS");
        assert_eq!(event.source, SOS_SOURCE);
        assert_eq!(event.trip_id.as_deref(), Some("T1"));
        assert_eq!(event.timestamp, record.timestamp);
        assert_eq!(event.duration, 2.4);
        assert_eq!(event.metadata, SosMetadata { palm_open: true, hands_detected: 1 });

        let other = ResultAssembler.sos_event(&record).unwrap();
        assert_ne!(event.event_id, other.event_id);
    }

    #[test]
    fn test_responses_flatten() {
        let record = ResultAssembler.assemble(parts(SosGesture::closed()), Utc::now());
        let response = AnalyzeResponse {
            record: record.clone(),
            backend_callback: CallbackStatus::sent("sent"),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["backend_callback"]["sent"], true);
        assert_eq!(json["trip_id"], "T1");

        let view = RiskView::from_record(record, CallbackStatus::failed("backend returned 503"));
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("sos_gesture").is_none());
        assert_eq!(json["backend_callback"]["message"], "backend returned 503");
    }

    #[test]
    fn test_trip_summary() {
        let counters = TripCounters {
            yawning_events: 2,
            total_frames_analyzed: 40,
            ..Default::default()
        };
        let summary = TripSummary::new("T9", counters, Utc::now());
        assert_eq!(summary.trip_duration_frames, 40);
        assert!(!summary.is_empty());
        assert!(TripSummary::new("T9", TripCounters::default(), Utc::now()).is_empty());
    }
}
