//! Temporal and weighted composite risk scoring

use dms::{round_to, RawScores};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::{CompositeWeights, RiskConfig};
use crate::counters::{EventKind, TripCounterStore, TripCounters};
use crate::level::{TemporalLevel, WeightedLevel};

/// Why a frame scored the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    HighEyeClosure,
    DriverDistraction,
    FrequentYawning,
    ElevatedSpeed,
    RepeatedDrowsiness,
    PersistentDistraction,
    ContinuousSpeeding,
}

/// Per-component points of the weighted score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedBreakdown {
    pub overspeed_component: f64,
    pub drowsiness_component: f64,
    pub distraction_component: f64,
    pub yawning_component: f64,
}

impl WeightedBreakdown {
    pub fn total(&self) -> f64 {
        self.overspeed_component
            + self.drowsiness_component
            + self.distraction_component
            + self.yawning_component
    }

    fn rounded(&self) -> Self {
        Self {
            overspeed_component: round_to(self.overspeed_component, 2),
            drowsiness_component: round_to(self.drowsiness_component, 2),
            distraction_component: round_to(self.distraction_component, 2),
            yawning_component: round_to(self.yawning_component, 2),
        }
    }
}

/// Risk result for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub temporal_score: f64,
    pub temporal_level: TemporalLevel,
    pub weighted_score: f64,
    pub weighted_level: WeightedLevel,
    pub reasons: Vec<RiskReason>,
    pub weighted_breakdown: WeightedBreakdown,
    pub weights: CompositeWeights,
    pub counters: TripCounters,
}

impl RiskAssessment {
    /// Level exposed to consumers; independent of trip history
    pub fn primary_level(&self) -> WeightedLevel {
        self.weighted_level
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.max(0.0)
    } else {
        0.0
    }
}

/// Trip-aware temporal score, clamped to [0, 100]
pub fn temporal_score(
    config: &RiskConfig,
    scores: &RawScores,
    speed: f64,
    counters: &TripCounters,
) -> f64 {
    let w = &config.temporal_weights;
    let speed_norm = sanitize_speed(speed).min(config.max_speed_kmh) / config.max_speed_kmh;

    let mut score = scores.eyes_closed_score * w.eyes_closed
        + scores.head_off_road_score * w.head_off_road
        + scores.yawning_score * w.yawning
        + speed_norm * w.speed;

    score += config.drowsiness_escalation.bonus(counters.drowsiness_events);
    score += config.yawning_escalation.bonus(counters.yawning_events);
    score += config.looking_away_escalation.bonus(counters.looking_away_events);

    if counters.overspeed_count > 0
        && counters.overspeed_ratio() >= config.fatigue_speeding_ratio
        && counters.has_fatigue_events()
    {
        score += config.fatigue_speeding_bonus;
    }

    score.clamp(0.0, 100.0)
}

/// Stateless weighted composite score and its components
pub fn weighted_score(config: &RiskConfig, scores: &RawScores, speed: f64) -> (f64, WeightedBreakdown) {
    let w = &config.composite_weights;
    let speed_norm = (sanitize_speed(speed) / config.max_speed_kmh).clamp(0.0, 1.0);

    let breakdown = WeightedBreakdown {
        overspeed_component: w.w1_overspeed * speed_norm * 100.0,
        drowsiness_component: w.w2_drowsiness * scores.eyes_closed_score * 100.0,
        distraction_component: w.w3_distraction * scores.head_off_road_score * 100.0,
        yawning_component: w.w4_yawning * scores.yawning_score * 100.0,
    };
    (breakdown.total().clamp(0.0, 100.0), breakdown)
}

/// Reason tags, in a fixed order
pub fn reasons(
    config: &RiskConfig,
    scores: &RawScores,
    speed: f64,
    counters: &TripCounters,
) -> Vec<RiskReason> {
    let checks = [
        (
            scores.eyes_closed_score >= config.drowsiness_event_threshold,
            RiskReason::HighEyeClosure,
        ),
        (
            scores.head_off_road_score >= config.looking_away_event_threshold,
            RiskReason::DriverDistraction,
        ),
        (
            scores.yawning_score >= config.yawning_event_threshold,
            RiskReason::FrequentYawning,
        ),
        (
            sanitize_speed(speed) >= config.elevated_speed_kmh,
            RiskReason::ElevatedSpeed,
        ),
        (
            counters.drowsiness_events >= config.repeated_drowsiness_events,
            RiskReason::RepeatedDrowsiness,
        ),
        (
            counters.looking_away_events >= config.persistent_distraction_events,
            RiskReason::PersistentDistraction,
        ),
        (
            counters.overspeed_count > config.continuous_speeding_frames,
            RiskReason::ContinuousSpeeding,
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(hit, reason)| hit.then_some(reason))
        .collect()
}

/// Updates trip counters and scores frames
pub struct RiskScorer {
    config: RiskConfig,
    store: Arc<TripCounterStore>,
}

impl RiskScorer {
    pub fn new(config: RiskConfig, store: Arc<TripCounterStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TripCounterStore> {
        &self.store
    }

    /// Score one frame for `trip`.
    ///
    /// Counter updates and the read-back happen under the trip's lock.
    pub fn assess(
        &self,
        trip: &str,
        scores: &RawScores,
        speed: f64,
        speed_limit: Option<f64>,
    ) -> RiskAssessment {
        let cfg = &self.config;
        let speed = sanitize_speed(speed);
        let limit = speed_limit
            .filter(|l| l.is_finite())
            .unwrap_or(cfg.default_speed_limit_kmh);

        let counters = self.store.update(trip, |c| {
            if scores.eyes_closed_score >= cfg.drowsiness_event_threshold {
                c.increment(EventKind::Drowsiness);
            }
            if scores.yawning_score >= cfg.yawning_event_threshold {
                c.increment(EventKind::Yawning);
            }
            if scores.head_off_road_score >= cfg.looking_away_event_threshold {
                c.increment(EventKind::LookingAway);
            }
            c.record_speed(speed, limit);
            *c
        });

        let temporal = temporal_score(cfg, scores, speed, &counters);
        let (weighted, breakdown) = weighted_score(cfg, scores, speed);
        let temporal_level = TemporalLevel::classify(temporal, &cfg.temporal_levels);
        let weighted_level = WeightedLevel::classify(weighted, &cfg.weighted_levels);

        debug!(
            "Trip '{}': temporal={:.2} ({}), weighted={:.2} ({})",
            trip, temporal, temporal_level, weighted, weighted_level
        );

        RiskAssessment {
            temporal_score: round_to(temporal, 2),
            temporal_level,
            weighted_score: round_to(weighted, 2),
            weighted_level,
            reasons: reasons(cfg, scores, speed, &counters),
            weighted_breakdown: breakdown.rounded(),
            weights: cfg.composite_weights,
            counters,
        }
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(RiskConfig::default(), Arc::new(TripCounterStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drowsy() -> RawScores {
        RawScores::new(1.0, 0.0, 0.0)
    }

    fn yawn() -> RawScores {
        RawScores::new(0.0, 0.0, 1.0)
    }

    fn distracted() -> RawScores {
        RawScores::new(0.0, 1.0, 0.0)
    }

    fn run(scorer: &RiskScorer, trip: &str, scores: RawScores, frames: usize) -> Vec<RiskAssessment> {
        (0..frames).map(|_| scorer.assess(trip, &scores, 0.0, None)).collect()
    }

    #[test]
    fn test_repeated_drowsiness_escalates() {
        let scorer = RiskScorer::default();
        let results = run(&scorer, "T1", drowsy(), 3);

        assert_eq!(results[0].temporal_score, 45.0);
        assert_eq!(results[1].counters.drowsiness_events, 2);
        assert_eq!(results[1].temporal_score, 55.0);
        assert_eq!(results[2].counters.drowsiness_events, 3);
        assert_eq!(results[2].temporal_score, 65.0);
        assert_eq!(results[2].temporal_level, TemporalLevel::High);
        assert!(results[2].reasons.contains(&RiskReason::RepeatedDrowsiness));
        assert!(!results[1].reasons.contains(&RiskReason::RepeatedDrowsiness));
    }

    #[test]
    fn test_repeated_yawning_escalates() {
        let scorer = RiskScorer::default();
        let results = run(&scorer, "T2", yawn(), 4);
        let scores: Vec<f64> = results.iter().map(|r| r.temporal_score).collect();

        assert_eq!(scores, vec![15.0, 20.0, 20.0, 30.0]);
        assert_eq!(results[3].counters.yawning_events, 4);
        assert!(scores[3] - scores[2] >= 10.0);
    }

    #[test]
    fn test_repeated_distraction_escalates() {
        let scorer = RiskScorer::default();
        let results = run(&scorer, "T3", distracted(), 5);
        let scores: Vec<f64> = results.iter().map(|r| r.temporal_score).collect();

        assert_eq!(scores, vec![30.0, 30.0, 45.0, 45.0, 55.0]);
        assert_eq!(results[4].counters.looking_away_events, 5);
        // 25-point tier replaces the 15-point tier
        assert_eq!(scores[4] - scores[3], 10.0);
        assert!(results[2].reasons.contains(&RiskReason::PersistentDistraction));
    }

    #[test]
    fn test_fatigue_with_overspeed_combo() {
        let scorer = RiskScorer::default();
        let first = scorer.assess("T4", &drowsy(), 75.0, None);
        let second = scorer.assess("T4", &drowsy(), 90.0, None);

        assert_eq!(first.counters.overspeed_count, 0);
        assert_eq!(first.temporal_score, 51.25);

        assert_eq!(second.counters.overspeed_count, 1);
        assert_eq!(second.counters.drowsiness_events, 2);
        assert_eq!(second.counters.overspeed_ratio(), 0.5);
        assert_eq!(second.temporal_score, 82.5);
        assert!(second.temporal_score - first.temporal_score >= 20.0);
        assert_eq!(second.temporal_level, TemporalLevel::Critical);
        assert!(second.reasons.contains(&RiskReason::ElevatedSpeed));
        assert!(!second.reasons.contains(&RiskReason::ContinuousSpeeding));
    }

    #[test]
    fn test_combo_needs_fatigue_events() {
        let scorer = RiskScorer::default();
        let result = scorer.assess("T5", &RawScores::zero(), 120.0, None);
        assert_eq!(result.counters.overspeed_count, 1);
        assert_eq!(result.temporal_score, 10.0);
    }

    #[test]
    fn test_continuous_speeding_after_four_frames() {
        let scorer = RiskScorer::default();
        let results: Vec<_> = (0..4)
            .map(|_| scorer.assess("T6", &RawScores::zero(), 100.0, None))
            .collect();
        assert!(!results[2].reasons.contains(&RiskReason::ContinuousSpeeding));
        assert!(results[3].reasons.contains(&RiskReason::ContinuousSpeeding));
    }

    #[test]
    fn test_all_dangers_frame() {
        let scorer = RiskScorer::default();
        let result = scorer.assess("T7", &RawScores::new(1.0, 1.0, 1.0), 120.0, None);

        assert_eq!(result.weighted_score, 100.0);
        assert_eq!(result.weighted_level, WeightedLevel::Critical);
        assert_eq!(result.primary_level(), WeightedLevel::Critical);
        assert_eq!(result.weighted_breakdown.overspeed_component, 25.0);
        assert_eq!(result.weighted_breakdown.distraction_component, 35.0);
        assert_eq!(
            result.reasons,
            vec![
                RiskReason::HighEyeClosure,
                RiskReason::DriverDistraction,
                RiskReason::FrequentYawning,
                RiskReason::ElevatedSpeed,
            ]
        );
        assert_eq!(result.temporal_score, 100.0);
    }

    #[test]
    fn test_all_normal_frame() {
        let scorer = RiskScorer::default();
        let result = scorer.assess("T8", &RawScores::zero(), 30.0, None);

        assert_eq!(result.weighted_score, 6.25);
        assert_eq!(result.weighted_level, WeightedLevel::Safe);
        assert!(result.reasons.is_empty());
        assert_eq!(result.temporal_level, TemporalLevel::Low);
    }

    #[test]
    fn test_speed_limit_override() {
        let scorer = RiskScorer::default();
        let result = scorer.assess("T9", &RawScores::zero(), 60.0, Some(50.0));
        assert_eq!(result.counters.overspeed_count, 1);

        let result = scorer.assess("T9", &RawScores::zero(), 60.0, None);
        assert_eq!(result.counters.overspeed_count, 1);
        assert_eq!(result.counters.total_frames_analyzed, 2);
    }

    #[test]
    fn test_negative_speed_clamped() {
        let scorer = RiskScorer::default();
        let result = scorer.assess("T10", &RawScores::zero(), -40.0, None);
        assert_eq!(result.weighted_score, 0.0);
        assert_eq!(result.temporal_score, 0.0);
    }

    #[test]
    fn test_first_frame_after_reset() {
        let scorer = RiskScorer::default();
        run(&scorer, "T11", drowsy(), 3);
        scorer.assess("T11", &drowsy(), 100.0, None);
        scorer.store().reset("T11");

        let result = scorer.assess("T11", &drowsy(), 100.0, None);
        assert_eq!(result.counters.total_frames_analyzed, 1);
        assert_eq!(result.counters.drowsiness_events, 1);
        assert_eq!(result.counters.overspeed_count, 1);
        // 45 + 100/120*10 + combo (ratio 1.0)
        assert_eq!(result.temporal_score, 73.33);
    }

    #[test]
    fn test_weighted_is_history_free() {
        let scorer = RiskScorer::default();
        run(&scorer, "T12", drowsy(), 5);
        let frame = RawScores::new(0.7, 0.2, 0.4);

        let seasoned = scorer.assess("T12", &frame, 65.0, None);
        let fresh = scorer.assess("T13", &frame, 65.0, None);
        assert_eq!(seasoned.weighted_score, fresh.weighted_score);
        assert_eq!(seasoned.weighted_breakdown, fresh.weighted_breakdown);
        assert!(seasoned.temporal_score > fresh.temporal_score);
    }

    #[test]
    fn test_assessment_json_shape() {
        let scorer = RiskScorer::default();
        let result = scorer.assess("T14", &drowsy(), 0.0, None);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["temporal_level"], "MEDIUM");
        assert_eq!(json["reasons"][0], "high_eye_closure");
        assert_eq!(json["weights"]["w3_distraction"], 0.35);
        assert_eq!(json["counters"]["drowsiness_events"], 1);
    }

    proptest! {
        #[test]
        fn prop_weighted_is_linear_and_bounded(
            eyes in 0.0f64..=1.0,
            head in 0.0f64..=1.0,
            yawning in 0.0f64..=1.0,
            speed in 0.0f64..300.0,
        ) {
            let config = RiskConfig::default();
            let scores = RawScores::new(eyes, head, yawning);
            let (score, _) = weighted_score(&config, &scores, speed);
            let expected = 25.0 * (speed / 120.0).min(1.0)
                + 30.0 * eyes
                + 35.0 * head
                + 10.0 * yawning;

            prop_assert!((0.0..=100.0).contains(&score));
            prop_assert!((score - expected).abs() < 1e-9);
        }

        #[test]
        fn prop_temporal_non_decreasing_with_repetition(
            eyes in 0.6f64..=1.0,
            speed in 0.0f64..80.0,
            frames in 2usize..8,
        ) {
            let scorer = RiskScorer::default();
            let scores = RawScores::new(eyes, 0.0, 0.0);
            let mut previous = 0.0;
            for _ in 0..frames {
                let result = scorer.assess("P", &scores, speed, None);
                prop_assert!(result.temporal_score >= previous);
                prop_assert!(result.temporal_score <= 100.0);
                previous = result.temporal_score;
            }
        }
    }
}
