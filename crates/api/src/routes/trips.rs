//! Trip counter routes

use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use trip_analysis::{CountersView, ResetAck, TripSummary};

use crate::AppState;

/// GET /trips/:trip_id/counters
pub async fn get_counters(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Json<CountersView> {
    Json(state.engine.trip_counters(&trip_id))
}

/// POST /trips/:trip_id/counters/reset
pub async fn reset_counters(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Json<ResetAck> {
    Json(state.engine.reset_trip(&trip_id))
}

/// POST /trips/:trip_id/complete
pub async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Json<TripSummary> {
    Json(state.engine.complete_trip(&trip_id))
}
