//! Frame analysis pipeline

use chrono::Utc;
use dms::{DetectionOutcome, DmsModule, SosGesture};
use frame_input::decode_base64_frame;
use result_sink::{CallbackStatus, ResultSink};
use risk_engine::{RiskScorer, TripCounterStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::assembler::{
    AnalysisRecord, AnalyzeResponse, CountersView, FrameParts, ResetAck, ResultAssembler,
    RiskView, SosEvent, TripSummary, COMPUTED_INPUT_TYPE, FRAME_INPUT_TYPE,
};
use crate::payload::{FrameInput, FramePayload};
use crate::{EngineConfig, EngineError};

/// Which endpoint a frame came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    AnalyzeFrame,
    ComputeRisk,
}

impl RequestKind {
    fn default_input_type(self) -> &'static str {
        match self {
            Self::AnalyzeFrame => FRAME_INPUT_TYPE,
            Self::ComputeRisk => COMPUTED_INPUT_TYPE,
        }
    }
}

/// Result of the CPU-bound part of a request, ready for forwarding
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub record: AnalysisRecord,
    pub sos_event: Option<SosEvent>,
}

/// Detection, scoring and forwarding for all trips
pub struct AnalysisEngine {
    dms: DmsModule,
    scorer: RiskScorer,
    sink: Box<dyn ResultSink>,
    assembler: ResultAssembler,
}

impl AnalysisEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let dms = DmsModule::new(config.dms)?;
        let scorer = RiskScorer::new(config.risk, Arc::new(TripCounterStore::new()));
        let sink = result_sink::from_config(&config.sink)?;
        info!("Analysis engine ready");
        Ok(Self::from_parts(dms, scorer, sink))
    }

    pub fn from_parts(dms: DmsModule, scorer: RiskScorer, sink: Box<dyn ResultSink>) -> Self {
        Self {
            dms,
            scorer,
            sink,
            assembler: ResultAssembler,
        }
    }

    pub fn dms(&self) -> &DmsModule {
        &self.dms
    }

    pub fn counter_store(&self) -> &Arc<TripCounterStore> {
        self.scorer.store()
    }

    /// Detect, score and assemble one frame. Never fails.
    pub fn evaluate(&self, payload: &FramePayload, kind: RequestKind) -> Evaluation {
        let trip = payload.trip_key();
        let mut cv_metrics = None;

        let (outcome, sos_gesture) = match &payload.input {
            FrameInput::Image(data) => match decode_base64_frame(data) {
                Ok(frame) => {
                    let analysis = self.dms.analyze(&frame, trip);
                    cv_metrics = Some(analysis.features.rounded());
                    (analysis.outcome, analysis.sos_gesture)
                }
                Err(e) => {
                    warn!("Frame for trip '{}' could not be decoded: {}", trip, e);
                    (
                        DetectionOutcome::empty("Failed to decode image"),
                        SosGesture::closed(),
                    )
                }
            },
            FrameInput::Signals(scores) => (
                self.dms.classify_signals(*scores),
                SosGesture::with_message("Signal mode: no image provided"),
            ),
        };

        let assessment = self.scorer.assess(
            trip,
            &outcome.raw_scores,
            payload.speed,
            payload.speed_limit,
        );

        let mode = if payload.is_image() { "image" } else { "signal" };
        metrics::counter!("frames_analyzed_total", "mode" => mode).increment(1);
        metrics::histogram!("risk_score_weighted").record(assessment.weighted_score);
        if sos_gesture.sos_triggered {
            metrics::counter!("sos_triggered_total").increment(1);
            warn!("SOS gesture held for {:.2}s on trip '{}'", sos_gesture.duration, trip);
        }

        let record = self.assembler.assemble(
            FrameParts {
                trip_id: payload.trip_id.as_deref(),
                detections: outcome.detections,
                assessment,
                sos_gesture,
                cv_metrics,
                message: outcome.message,
                input_type: payload
                    .input_type
                    .clone()
                    .unwrap_or_else(|| kind.default_input_type().to_string()),
                frame_id: payload.frame_id.clone(),
                video_id: payload.video_id.clone(),
            },
            Utc::now(),
        );
        let sos_event = self.assembler.sos_event(&record);

        debug!(
            "Trip '{}': {} detections, risk {} ({:.2})",
            trip,
            record.detections.len(),
            record.risk_level,
            record.risk_score_weighted
        );

        Evaluation { record, sos_event }
    }

    /// Forward the record, then the SOS event if any. Returns the record's delivery status.
    pub async fn deliver(&self, evaluation: &Evaluation) -> CallbackStatus {
        let trip_id = evaluation.record.trip_id.as_deref();
        let status = match serde_json::to_value(&evaluation.record) {
            Ok(body) => self.sink.forward_result(trip_id, &body).await,
            Err(e) => CallbackStatus::failed(e.to_string()),
        };

        if let Some(event) = &evaluation.sos_event {
            match serde_json::to_value(event) {
                Ok(body) => {
                    let sos_status = self.sink.forward_sos(trip_id, &body).await;
                    if !sos_status.sent {
                        warn!("SOS event {} not delivered: {}", event.event_id, sos_status.message);
                    }
                }
                Err(e) => warn!("SOS event {} not serializable: {}", event.event_id, e),
            }
        }

        status
    }

    pub async fn analyze_frame(&self, payload: &FramePayload) -> AnalyzeResponse {
        let evaluation = self.evaluate(payload, RequestKind::AnalyzeFrame);
        let backend_callback = self.deliver(&evaluation).await;
        AnalyzeResponse {
            record: evaluation.record,
            backend_callback,
        }
    }

    pub async fn compute_risk(&self, payload: &FramePayload) -> RiskView {
        let evaluation = self.evaluate(payload, RequestKind::ComputeRisk);
        let backend_callback = self.deliver(&evaluation).await;
        RiskView::from_record(evaluation.record, backend_callback)
    }

    /// Current counters; unknown trips start at zero
    pub fn trip_counters(&self, trip: &str) -> CountersView {
        CountersView {
            trip_id: trip.to_string(),
            event_counters: self.counter_store().get_or_create(trip),
            timestamp: Utc::now(),
        }
    }

    pub fn reset_trip(&self, trip: &str) -> ResetAck {
        self.counter_store().reset(trip);
        self.dms.gesture().forget(trip);
        ResetAck {
            trip_id: trip.to_string(),
            message: "Event counters reset".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Final counters, then forget the trip
    pub fn complete_trip(&self, trip: &str) -> TripSummary {
        let counters = self.counter_store().complete(trip);
        self.dms.gesture().forget(trip);
        TripSummary::new(trip, counters, Utc::now())
    }
}
