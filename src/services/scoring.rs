// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Score and rank participants.
//!
//! Scoring is a pure function of a participant's metrics and the
//! competition's scoring rule; ranking sorts a whole leaderboard at once.

use crate::models::{LeaderboardEntry, ParticipantMetrics, ScoringType};

/// Fastest-pace score is this constant divided by pace (seconds per km).
pub const PACE_SCORE_NUMERATOR: f64 = 10_000.0;

/// Consistency is records per competition day, as a percentage.
pub const CONSISTENCY_MULTIPLIER: f64 = 100.0;

/// Map metrics to a score under `scoring`.
///
/// `competition_days` is at least 1. Unknown scoring types score 0.
pub fn score(
    metrics: &ParticipantMetrics,
    scoring: &ScoringType,
    competition_days: f64,
    count_weight: Option<f64>,
) -> f64 {
    let count = f64::from(metrics.record_count);
    let value = match scoring {
        ScoringType::TotalDistance => metrics.total_distance_meters,
        ScoringType::FastestPace => {
            let pace = metrics.average_pace_seconds_per_km;
            if pace > 0.0 {
                PACE_SCORE_NUMERATOR / pace
            } else {
                0.0
            }
        }
        ScoringType::TotalDuration => metrics.total_duration_seconds,
        ScoringType::Consistency => count / competition_days.max(1.0) * CONSISTENCY_MULTIPLIER,
        ScoringType::WorkoutCount | ScoringType::SessionCount => count * count_weight.unwrap_or(1.0),
        ScoringType::Unknown(name) => {
            tracing::warn!(scoring = %name, "Unknown scoring type, scoring as 0");
            0.0
        }
    };

    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Sort by score descending and assign 1-based ranks.
///
/// The sort is stable, so equal scores keep their input order.
pub fn rank(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.rank = position as u32 + 1;
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantAggregate;

    fn metrics(distance: f64, duration: f64, count: u32, pace: f64) -> ParticipantMetrics {
        ParticipantMetrics {
            total_distance_meters: distance,
            total_duration_seconds: duration,
            record_count: count,
            average_pace_seconds_per_km: pace,
            longest_distance_meters: distance,
            current_streak_days: 0,
        }
    }

    fn entry(id: &str, score: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            participant_id: id.to_string(),
            score,
            rank: 0,
            metrics: metrics(0.0, 0.0, 0, 0.0),
            aggregate: ParticipantAggregate::new(id),
        }
    }

    #[test]
    fn test_score_rules() {
        let m = metrics(8000.0, 2700.0, 2, 337.5);
        assert_eq!(score(&m, &ScoringType::TotalDistance, 30.0, None), 8000.0);
        assert_eq!(score(&m, &ScoringType::TotalDuration, 30.0, None), 2700.0);
        assert_eq!(score(&m, &ScoringType::WorkoutCount, 30.0, None), 2.0);
        assert_eq!(score(&m, &ScoringType::SessionCount, 30.0, Some(1.5)), 3.0);
        assert_eq!(score(&m, &ScoringType::Consistency, 10.0, None), 20.0);

        let pace = score(&m, &ScoringType::FastestPace, 30.0, None);
        assert!((pace - PACE_SCORE_NUMERATOR / 337.5).abs() < 1e-9);
    }

    #[test]
    fn test_faster_pace_scores_higher() {
        let fast = metrics(10_000.0, 2400.0, 1, 240.0);
        let slow = metrics(10_000.0, 3600.0, 1, 360.0);
        assert!(
            score(&fast, &ScoringType::FastestPace, 1.0, None)
                > score(&slow, &ScoringType::FastestPace, 1.0, None)
        );
    }

    #[test]
    fn test_zero_pace_scores_zero() {
        let m = metrics(0.0, 0.0, 0, 0.0);
        assert_eq!(score(&m, &ScoringType::FastestPace, 1.0, None), 0.0);
    }

    #[test]
    fn test_unknown_scoring_scores_zero() {
        let m = metrics(5000.0, 1800.0, 1, 360.0);
        let unknown = ScoringType::Unknown("elevation".to_string());
        assert_eq!(score(&m, &unknown, 1.0, None), 0.0);
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let ranked = rank(vec![
            entry("a", 5.0),
            entry("b", 10.0),
            entry("c", 5.0),
            entry("d", 0.0),
            entry("e", 10.0),
        ]);
        let order: Vec<(&str, u32)> = ranked
            .iter()
            .map(|e| (e.participant_id.as_str(), e.rank))
            .collect();
        assert_eq!(
            order,
            vec![("b", 1), ("e", 2), ("a", 3), ("c", 4), ("d", 5)]
        );
    }
}
