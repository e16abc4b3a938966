// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Competition definitions and scoring rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ActivityCategory;

/// How a competition turns participant metrics into a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScoringType {
    TotalDistance,
    FastestPace,
    TotalDuration,
    Consistency,
    WorkoutCount,
    SessionCount,
    /// Anything a client published that we don't know how to score.
    Unknown(String),
}

impl From<String> for ScoringType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "total_distance" | "distance" => Self::TotalDistance,
            "fastest_pace" | "fastest_average_pace" | "pace" => Self::FastestPace,
            "total_duration" | "duration" => Self::TotalDuration,
            "consistency" => Self::Consistency,
            "workout_count" => Self::WorkoutCount,
            "session_count" => Self::SessionCount,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<ScoringType> for String {
    fn from(scoring: ScoringType) -> Self {
        scoring.to_string()
    }
}

impl fmt::Display for ScoringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TotalDistance => f.write_str("total_distance"),
            Self::FastestPace => f.write_str("fastest_pace"),
            Self::TotalDuration => f.write_str("total_duration"),
            Self::Consistency => f.write_str("consistency"),
            Self::WorkoutCount => f.write_str("workout_count"),
            Self::SessionCount => f.write_str("session_count"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// A competition (league or event) with its eligible participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    pub id: String,
    pub name: String,
    /// Owning team, when the roster comes from a team
    #[serde(default)]
    pub team_id: Option<String>,
    pub activity: ActivityCategory,
    pub scoring: ScoringType,
    /// Multiplier for count-based scoring types
    #[serde(default)]
    pub count_weight: Option<f64>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Team roster or opt-in join list (author public keys)
    #[serde(default)]
    pub members: Vec<String>,
}

impl Competition {
    /// Eligible participants in declaration order, duplicates removed.
    pub fn eligible_participants(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.members
            .iter()
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect()
    }

    /// Competition length in whole days, never less than one.
    pub fn duration_days(&self) -> f64 {
        let days = (self.end - self.start).num_seconds() as f64 / 86_400.0;
        days.ceil().max(1.0)
    }

    pub fn includes(&self, participant_id: &str) -> bool {
        self.members.iter().any(|m| m == participant_id)
    }

    pub fn contains_time(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}
