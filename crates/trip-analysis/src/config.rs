//! Engine configuration

use dms::DmsConfig;
use result_sink::SinkConfig;
use risk_engine::RiskConfig;
use serde::{Deserialize, Serialize};

/// Complete analysis engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dms: DmsConfig,
    pub risk: RiskConfig,
    pub sink: SinkConfig,
}

impl EngineConfig {
    /// Stricter detection thresholds, same scoring
    pub fn strict() -> Self {
        Self {
            dms: DmsConfig::strict(),
            ..Default::default()
        }
    }

    /// Image frames are decoded but never localize a face
    pub fn signals_only() -> Self {
        Self {
            dms: DmsConfig::signals_only(),
            ..Default::default()
        }
    }
}
