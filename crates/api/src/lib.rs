//! Driver Risk Analysis API Server
//!
//! HTTP front end for the trip analysis engine: frame analysis, risk-only
//! scoring, trip counter management, health and Prometheus metrics.

pub mod error;
pub mod routes;
pub mod settings;

pub use error::ApiError;
pub use settings::{ServerSettings, Settings};

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trip_analysis::AnalysisEngine;

/// Name reported by `/health`
pub const SERVICE_NAME: &str = "driver_risk_engine";

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<AnalysisEngine>,
    /// Prometheus handle, when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: AnalysisEngine, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            engine: Arc::new(engine),
            metrics,
            start_time: Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::service::health))
        .route("/metrics", get(routes::service::metrics))
        .route("/analyze_frame", post(routes::analysis::analyze_frame))
        .route("/compute_risk", post(routes::analysis::compute_risk))
        .route("/trips/:trip_id/counters", get(routes::trips::get_counters))
        .route("/trips/:trip_id/counters/reset", post(routes::trips::reset_counters))
        .route("/trips/:trip_id/complete", post(routes::trips::complete_trip))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("Invalid CORS origin '{}' ({}), allowing any", origin, e);
            layer.allow_origin(Any)
        }
    }
}

/// Initialize logging
pub fn init_logging(settings: &ServerSettings) -> Result<(), ApiError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|e| ApiError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if settings.json_logs {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.map_err(|e| ApiError::Logging(e.to_string()))
}

/// Install the global Prometheus recorder
pub fn install_metrics() -> Result<PrometheusHandle, ApiError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Build the engine and serve until interrupted
pub async fn run_server(settings: Settings) -> Result<(), ApiError> {
    let metrics = if settings.server.metrics_enabled {
        Some(install_metrics()?)
    } else {
        None
    };

    let engine = AnalysisEngine::new(settings.engine)?;
    let state = Arc::new(AppState::new(engine, metrics));
    let app = create_router(state)
        .layer(cors_layer(&settings.server.cors_origin))
        .layer(TraceLayer::new_for_http());

    let addr = settings.server.bind_addr();
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
