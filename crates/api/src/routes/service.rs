//! Health and metrics routes

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub detector: &'static str,
    pub gesture_backend: bool,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let dms = state.engine.dms();
    Json(HealthResponse {
        status: "ok",
        service: crate::SERVICE_NAME,
        detector: if dms.extractor().has_face_locator() {
            "haar_cascade"
        } else {
            "signals_only"
        },
        gesture_backend: dms.gesture().is_available(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
