//! Trip Analysis Pipeline
//!
//! Ties the per-frame stages together:
//! - Payload interpretation (image or pre-computed signals)
//! - Driver monitoring and SOS gesture detection
//! - Trip-scoped temporal and weighted risk scoring
//! - Result assembly and best-effort forwarding to the trip backend

pub mod assembler;
pub mod config;
pub mod engine;
pub mod payload;

pub use assembler::{
    AnalysisRecord, AnalyzeResponse, CountersView, ResetAck, ResultAssembler, RiskView, SosEvent,
    TripSummary,
};
pub use config::EngineConfig;
pub use engine::{AnalysisEngine, Evaluation, RequestKind};
pub use payload::{FrameInput, FramePayload};

use thiserror::Error;

/// Engine construction errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("DMS setup failed: {0}")]
    Dms(#[from] dms::DmsError),

    #[error("Result sink setup failed: {0}")]
    Sink(#[from] result_sink::SinkError),
}
