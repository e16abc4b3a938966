//! Per-participant accumulators built during one aggregation pass.
//!
//! An aggregate is rebuilt from scratch every time a leaderboard is
//! computed; nothing here is persisted between passes.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::models::ActivityRecord;

/// Running totals for a single participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantAggregate {
    pub participant_id: String,

    // ─── Totals ──────────────────────────────────────────────────
    pub total_distance_meters: f64,
    pub total_duration_seconds: f64,
    pub total_calories: f64,
    pub record_count: u32,

    // ─── Pace ────────────────────────────────────────────────────
    /// Distance summed only over records that have both distance and duration
    pub paced_distance_meters: f64,
    /// Duration summed only over records that have both distance and duration
    pub paced_duration_seconds: f64,
    /// Fastest single-record pace (seconds per km)
    pub best_pace_seconds_per_km: Option<f64>,

    // ─── Bests ───────────────────────────────────────────────────
    pub longest_distance_meters: f64,
    pub longest_duration_seconds: f64,

    // ─── Recency ─────────────────────────────────────────────────
    pub last_activity: Option<DateTime<Utc>>,
    /// UTC days with at least one qualifying record
    pub active_days: BTreeSet<NaiveDate>,

    // ─── Idempotency ─────────────────────────────────────────────
    #[serde(skip)]
    processed_event_ids: HashSet<String>,
}

/// Derived metrics handed to the scoring function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantMetrics {
    pub total_distance_meters: f64,
    pub total_duration_seconds: f64,
    pub record_count: u32,
    /// Seconds per km over records that have both fields; 0 when unknown
    pub average_pace_seconds_per_km: f64,
    pub longest_distance_meters: f64,
    pub current_streak_days: u32,
}

impl ParticipantAggregate {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            ..Self::default()
        }
    }

    /// Fold a record into the totals.
    ///
    /// Returns `false` if the record's event ID was already counted.
    pub fn update_from_record(&mut self, record: &ActivityRecord) -> bool {
        if !self.processed_event_ids.insert(record.event_id.clone()) {
            return false;
        }

        self.record_count += 1;
        self.total_duration_seconds += record.duration_seconds;
        self.total_calories += record.calories.unwrap_or(0.0);
        self.longest_duration_seconds = self.longest_duration_seconds.max(record.duration_seconds);

        if let Some(distance) = record.distance_meters {
            self.total_distance_meters += distance;
            self.longest_distance_meters = self.longest_distance_meters.max(distance);
        }

        if let Some(pace) = record.pace_seconds_per_km() {
            self.paced_distance_meters += record.distance_meters.unwrap_or(0.0);
            self.paced_duration_seconds += record.duration_seconds;
            self.best_pace_seconds_per_km = Some(match self.best_pace_seconds_per_km {
                Some(best) => best.min(pace),
                None => pace,
            });
        }

        if self.last_activity.is_none_or(|last| record.timestamp > last) {
            self.last_activity = Some(record.timestamp);
        }
        self.active_days.insert(record.day());

        true
    }

    /// Average pace in seconds per km, 0 when no record had both fields.
    pub fn average_pace(&self) -> f64 {
        if self.paced_distance_meters > 0.0 {
            self.paced_duration_seconds / (self.paced_distance_meters / 1000.0)
        } else {
            0.0
        }
    }

    /// Consecutive active days counted backward from `today` (inclusive).
    pub fn streak_ending(&self, today: NaiveDate) -> u32 {
        let mut streak = 0;
        let mut day = today;
        while self.active_days.contains(&day) {
            streak += 1;
            match day.checked_sub_days(Days::new(1)) {
                Some(prev) => day = prev,
                None => break,
            }
        }
        streak
    }

    pub fn metrics(&self, today: NaiveDate) -> ParticipantMetrics {
        ParticipantMetrics {
            total_distance_meters: self.total_distance_meters,
            total_duration_seconds: self.total_duration_seconds,
            record_count: self.record_count,
            average_pace_seconds_per_km: self.average_pace(),
            longest_distance_meters: self.longest_distance_meters,
            current_streak_days: self.streak_ending(today),
        }
    }
}
