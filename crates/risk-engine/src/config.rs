//! Risk scoring configuration

use serde::{Deserialize, Serialize};

/// One escalation step: `bonus` once at least `min_events` were seen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationTier {
    pub min_events: u64,
    pub bonus: f64,
}

/// Ordered escalation tiers for one event counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub tiers: Vec<EscalationTier>,
}

impl EscalationRule {
    pub fn new(tiers: &[(u64, f64)]) -> Self {
        Self {
            tiers: tiers
                .iter()
                .map(|&(min_events, bonus)| EscalationTier { min_events, bonus })
                .collect(),
        }
    }

    /// Bonus of the highest tier reached; only one tier applies
    pub fn bonus(&self, events: u64) -> f64 {
        self.tiers
            .iter()
            .filter(|tier| events >= tier.min_events)
            .max_by_key(|tier| tier.min_events)
            .map(|tier| tier.bonus)
            .unwrap_or(0.0)
    }
}

/// Per-frame point contributions of the temporal score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalWeights {
    pub eyes_closed: f64,
    pub head_off_road: f64,
    pub yawning: f64,
    pub speed: f64,
}

impl Default for TemporalWeights {
    fn default() -> Self {
        Self {
            eyes_closed: 45.0,
            head_off_road: 30.0,
            yawning: 15.0,
            speed: 10.0,
        }
    }
}

/// Weights of the composite score; reported verbatim in results
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub w1_overspeed: f64,
    pub w2_drowsiness: f64,
    pub w3_distraction: f64,
    pub w4_yawning: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            w1_overspeed: 0.25,
            w2_drowsiness: 0.30,
            w3_distraction: 0.35,
            w4_yawning: 0.10,
        }
    }
}

/// Lower bounds of the upper three levels of a score scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelCutoffs {
    pub critical: f64,
    pub high: f64,
    pub elevated: f64,
}

/// Risk engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Eyes-closed score that counts as a drowsiness event
    pub drowsiness_event_threshold: f64,
    /// Yawning score that counts as a yawning event
    pub yawning_event_threshold: f64,
    /// Head-off-road score that counts as a looking-away event
    pub looking_away_event_threshold: f64,
    /// Speed limit when the payload carries none (km/h)
    pub default_speed_limit_kmh: f64,
    /// Speed at which the speed component saturates (km/h)
    pub max_speed_kmh: f64,
    /// Speed reported as `elevated_speed` (km/h)
    pub elevated_speed_kmh: f64,
    pub temporal_weights: TemporalWeights,
    pub drowsiness_escalation: EscalationRule,
    pub yawning_escalation: EscalationRule,
    pub looking_away_escalation: EscalationRule,
    /// Overspeed share of frames at which the fatigue combo applies (inclusive)
    pub fatigue_speeding_ratio: f64,
    pub fatigue_speeding_bonus: f64,
    /// Events at which `repeated_drowsiness` is reported
    pub repeated_drowsiness_events: u64,
    /// Events at which `persistent_distraction` is reported
    pub persistent_distraction_events: u64,
    /// `continuous_speeding` is reported above this many overspeed frames
    pub continuous_speeding_frames: u64,
    pub temporal_levels: LevelCutoffs,
    pub composite_weights: CompositeWeights,
    pub weighted_levels: LevelCutoffs,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            drowsiness_event_threshold: 0.6,
            yawning_event_threshold: 0.55,
            looking_away_event_threshold: 0.5,
            default_speed_limit_kmh: 80.0,
            max_speed_kmh: 120.0,
            elevated_speed_kmh: 80.0,
            temporal_weights: TemporalWeights::default(),
            drowsiness_escalation: EscalationRule::new(&[(2, 10.0), (3, 20.0)]),
            yawning_escalation: EscalationRule::new(&[(2, 5.0), (4, 15.0)]),
            looking_away_escalation: EscalationRule::new(&[(3, 15.0), (5, 25.0)]),
            fatigue_speeding_ratio: 0.5,
            fatigue_speeding_bonus: 20.0,
            repeated_drowsiness_events: 3,
            persistent_distraction_events: 3,
            continuous_speeding_frames: 3,
            temporal_levels: LevelCutoffs {
                critical: 80.0,
                high: 60.0,
                elevated: 35.0,
            },
            composite_weights: CompositeWeights::default(),
            weighted_levels: LevelCutoffs {
                critical: 76.0,
                high: 51.0,
                elevated: 21.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_picks_highest_tier() {
        let rule = EscalationRule::new(&[(3, 15.0), (5, 25.0)]);
        assert_eq!(rule.bonus(0), 0.0);
        assert_eq!(rule.bonus(2), 0.0);
        assert_eq!(rule.bonus(3), 15.0);
        assert_eq!(rule.bonus(4), 15.0);
        assert_eq!(rule.bonus(5), 25.0);
        assert_eq!(rule.bonus(50), 25.0);
    }

    #[test]
    fn test_escalation_tier_order_is_irrelevant() {
        let rule = EscalationRule::new(&[(3, 20.0), (2, 10.0)]);
        assert_eq!(rule.bonus(2), 10.0);
        assert_eq!(rule.bonus(3), 20.0);
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = CompositeWeights::default();
        let sum = w.w1_overspeed + w.w2_drowsiness + w.w3_distraction + w.w4_yawning;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: RiskConfig =
            serde_json::from_str(r#"{"default_speed_limit_kmh": 100.0}"#).unwrap();
        assert_eq!(config.default_speed_limit_kmh, 100.0);
        assert_eq!(config.fatigue_speeding_bonus, 20.0);
        assert_eq!(config.drowsiness_escalation, RiskConfig::default().drowsiness_escalation);
    }
}
