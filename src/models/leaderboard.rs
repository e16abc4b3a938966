// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ranked competition results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::stats::{ParticipantAggregate, ParticipantMetrics};

/// One row of a leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub participant_id: String,
    pub score: f64,
    /// 1-based position after sorting
    pub rank: u32,
    pub metrics: ParticipantMetrics,
    pub aggregate: ParticipantAggregate,
}

/// Ordered entries plus generation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub competition_id: String,
    pub generated_at: DateTime<Utc>,
    pub total_records: u32,
    pub total_participants: u32,
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// A well-formed leaderboard with no rows.
    pub fn empty(competition_id: &str) -> Self {
        Self {
            competition_id: competition_id.to_string(),
            generated_at: Utc::now(),
            total_records: 0,
            total_participants: 0,
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, participant_id: &str) -> Option<&LeaderboardEntry> {
        self.entries
            .iter()
            .find(|e| e.participant_id == participant_id)
    }
}
