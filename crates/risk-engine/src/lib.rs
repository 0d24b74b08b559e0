//! Rule-Based Risk Engine
//!
//! Two complementary risk scores per frame:
//! - Temporal score: current frame plus escalation on repeated events within a trip
//! - Weighted composite score: stateless, current frame and speed only
//!
//! Per-trip counters live in an injectable `TripCounterStore` with one lock per trip.

pub mod config;
pub mod counters;
pub mod level;
pub mod scorer;

pub use config::{CompositeWeights, EscalationRule, EscalationTier, LevelCutoffs, RiskConfig, TemporalWeights};
pub use counters::{EventKind, TripCounterStore, TripCounters};
pub use level::{TemporalLevel, WeightedLevel};
pub use scorer::{RiskAssessment, RiskReason, RiskScorer, WeightedBreakdown};

use thiserror::Error;

/// Risk engine errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RiskError {
    #[error("Unknown event kind: {0}")]
    UnknownEvent(String),
}
