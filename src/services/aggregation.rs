// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Turn a competition's records into a ranked leaderboard.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use super::scoring;
use crate::models::{
    ActivityRecord, Competition, Leaderboard, LeaderboardEntry, ParticipantAggregate,
};

/// Per-participant aggregates in roster order.
///
/// Every participant gets an aggregate, even with no qualifying records.
/// Records by non-participants, of another category, or outside the
/// competition period are ignored; duplicate event ids count once.
pub fn aggregate(
    competition: &Competition,
    participants: &[String],
    records: &[ActivityRecord],
) -> Vec<ParticipantAggregate> {
    let mut aggregates: Vec<ParticipantAggregate> = participants
        .iter()
        .map(ParticipantAggregate::new)
        .collect();
    let index: HashMap<&str, usize> = participants
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_str(), i))
        .collect();

    for record in records {
        if record.category != competition.activity || !competition.contains_time(record.timestamp) {
            continue;
        }
        if let Some(&i) = index.get(record.participant_id.as_str()) {
            aggregates[i].update_from_record(record);
        }
    }

    aggregates
}

/// Aggregate, score, and rank `records` for `competition`.
pub fn build_leaderboard(
    competition: &Competition,
    participants: &[String],
    records: &[ActivityRecord],
    today: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Leaderboard {
    let aggregates = aggregate(competition, participants, records);
    rank_aggregates(competition, aggregates, today, generated_at)
}

/// Score finished aggregates and rank them as one leaderboard.
pub fn rank_aggregates(
    competition: &Competition,
    aggregates: Vec<ParticipantAggregate>,
    today: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Leaderboard {
    let days = competition.duration_days();
    let total_records = aggregates.iter().map(|a| a.record_count).sum();
    let total_participants = aggregates.len() as u32;

    let entries = aggregates
        .into_iter()
        .map(|aggregate| {
            let metrics = aggregate.metrics(today);
            LeaderboardEntry {
                participant_id: aggregate.participant_id.clone(),
                score: scoring::score(
                    &metrics,
                    &competition.scoring,
                    days,
                    competition.count_weight,
                ),
                rank: 0,
                metrics,
                aggregate,
            }
        })
        .collect();

    Leaderboard {
        competition_id: competition.id.clone(),
        generated_at,
        total_records,
        total_participants,
        entries: scoring::rank(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityCategory, ScoringType};
    use chrono::{Duration, TimeZone};

    fn competition(scoring: ScoringType) -> Competition {
        Competition {
            id: "jan".to_string(),
            name: "January Distance".to_string(),
            team_id: Some("team-1".to_string()),
            activity: ActivityCategory::Running,
            scoring,
            count_weight: None,
            start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            members: vec!["alice".to_string(), "bob".to_string(), "carol".to_string()],
        }
    }

    fn record(id: &str, who: &str, km: f64, secs: f64, day: u32) -> ActivityRecord {
        ActivityRecord {
            event_id: id.to_string(),
            participant_id: who.to_string(),
            category: ActivityCategory::Running,
            distance_meters: Some(km * 1000.0),
            duration_seconds: secs,
            calories: None,
            timestamp: Utc.with_ymd_and_hms(2026, 1, day, 7, 0, 0).unwrap(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 20).unwrap()
    }

    #[test]
    fn test_total_distance_example() {
        let comp = competition(ScoringType::TotalDistance);
        let participants = vec!["alice".to_string(), "bob".to_string()];
        let records = vec![
            record("a1", "alice", 5.0, 1800.0, 3),
            record("a2", "alice", 3.0, 900.0, 4),
            record("b1", "bob", 10.0, 3000.0, 5),
        ];

        let board = build_leaderboard(&comp, &participants, &records, today(), Utc::now());
        let rows: Vec<(&str, f64, u32)> = board
            .entries
            .iter()
            .map(|e| (e.participant_id.as_str(), e.score, e.rank))
            .collect();
        assert_eq!(rows, vec![("bob", 10000.0, 1), ("alice", 8000.0, 2)]);
        assert_eq!(board.total_records, 3);
        assert_eq!(board.total_participants, 2);
    }

    #[test]
    fn test_participants_without_records_appear_with_zero() {
        let comp = competition(ScoringType::TotalDistance);
        let participants = comp.eligible_participants();
        let records = vec![record("b1", "bob", 4.0, 1500.0, 2)];

        let board = build_leaderboard(&comp, &participants, &records, today(), Utc::now());
        assert_eq!(board.entries.len(), 3);
        assert_eq!(board.entries[0].participant_id, "bob");
        // alice and carol tie at 0 and keep roster order.
        assert_eq!(board.entries[1].participant_id, "alice");
        assert_eq!(board.entries[2].participant_id, "carol");
        assert_eq!(board.entries[2].score, 0.0);
        assert_eq!(board.entries[2].rank, 3);
    }

    #[test]
    fn test_filters_category_period_and_outsiders() {
        let comp = competition(ScoringType::WorkoutCount);
        let participants = comp.eligible_participants();

        let mut ride = record("x1", "alice", 20.0, 3600.0, 6);
        ride.category = ActivityCategory::Cycling;
        let mut early = record("x2", "alice", 5.0, 1800.0, 6);
        early.timestamp = comp.start - Duration::days(1);
        let outsider = record("x3", "mallory", 5.0, 1800.0, 6);
        let counted = record("x4", "alice", 5.0, 1800.0, 6);

        let aggregates = aggregate(&comp, &participants, &[ride, early, outsider, counted]);
        assert_eq!(aggregates[0].record_count, 1);
        assert_eq!(aggregates.iter().map(|a| a.record_count).sum::<u32>(), 1);
    }

    #[test]
    fn test_duplicate_records_count_once() {
        let comp = competition(ScoringType::TotalDistance);
        let participants = comp.eligible_participants();
        let dup = record("same", "carol", 5.0, 1800.0, 8);

        let board = build_leaderboard(
            &comp,
            &participants,
            &[dup.clone(), dup],
            today(),
            Utc::now(),
        );
        assert_eq!(board.entry("carol").unwrap().score, 5000.0);
        assert_eq!(board.total_records, 1);
    }

    #[test]
    fn test_recompute_is_identical() {
        let comp = competition(ScoringType::FastestPace);
        let participants = comp.eligible_participants();
        let records = vec![
            record("a1", "alice", 5.0, 1500.0, 3),
            record("b1", "bob", 5.0, 1500.0, 3),
            record("c1", "carol", 10.0, 3300.0, 4),
        ];
        let at = Utc::now();

        let first = build_leaderboard(&comp, &participants, &records, today(), at);
        let second = build_leaderboard(&comp, &participants, &records, today(), at);
        assert_eq!(first, second);
        // alice and bob tie on pace; roster order decides.
        assert_eq!(first.entries[0].participant_id, "alice");
        assert_eq!(first.entries[1].participant_id, "bob");
    }
}
