//! API error type

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Engine setup failed: {0}")]
    Engine(#[from] trip_analysis::EngineError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics setup failed: {0}")]
    Metrics(String),

    #[error("Analysis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
