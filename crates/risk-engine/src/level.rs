//! Severity levels for both risk scores

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::LevelCutoffs;

/// Level of the trip-aware temporal score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl TemporalLevel {
    pub fn classify(score: f64, cutoffs: &LevelCutoffs) -> Self {
        if score >= cutoffs.critical {
            Self::Critical
        } else if score >= cutoffs.high {
            Self::High
        } else if score >= cutoffs.elevated {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Level of the stateless weighted score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightedLevel {
    Safe,
    Moderate,
    High,
    Critical,
}

impl WeightedLevel {
    pub fn classify(score: f64, cutoffs: &LevelCutoffs) -> Self {
        if score >= cutoffs.critical {
            Self::Critical
        } else if score >= cutoffs.high {
            Self::High
        } else if score >= cutoffs.elevated {
            Self::Moderate
        } else {
            Self::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for TemporalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WeightedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
