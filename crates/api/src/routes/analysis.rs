//! Frame analysis routes

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use trip_analysis::{AnalyzeResponse, Evaluation, FramePayload, RequestKind, RiskView};

use crate::{ApiError, AppState};

/// Lenient body parsing: invalid JSON reads as an empty payload
fn parse_payload(body: &[u8]) -> FramePayload {
    let value = serde_json::from_slice::<Value>(body).unwrap_or_else(|e| {
        if !body.is_empty() {
            debug!("Ignoring unparseable request body: {}", e);
        }
        Value::Null
    });
    FramePayload::from_json(&value)
}

/// Run the CPU-bound part off the async workers
async fn evaluate(state: &Arc<AppState>, body: &[u8], kind: RequestKind) -> Result<Evaluation, ApiError> {
    let payload = parse_payload(body);
    let engine = Arc::clone(&state.engine);
    let evaluation = tokio::task::spawn_blocking(move || engine.evaluate(&payload, kind)).await?;
    Ok(evaluation)
}

/// POST /analyze_frame
pub async fn analyze_frame(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let evaluation = evaluate(&state, &body, RequestKind::AnalyzeFrame).await?;
    let backend_callback = state.engine.deliver(&evaluation).await;
    Ok(Json(AnalyzeResponse {
        record: evaluation.record,
        backend_callback,
    }))
}

/// POST /compute_risk
pub async fn compute_risk(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RiskView>, ApiError> {
    let evaluation = evaluate(&state, &body, RequestKind::ComputeRisk).await?;
    let backend_callback = state.engine.deliver(&evaluation).await;
    Ok(Json(RiskView::from_record(evaluation.record, backend_callback)))
}
