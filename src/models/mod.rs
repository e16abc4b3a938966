// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod competition;
pub mod event;
pub mod leaderboard;
pub mod stats;

pub use activity::{ActivityCategory, ActivityRecord};
pub use competition::{Competition, ScoringType};
pub use event::{QueryFilter, RawEvent, WORKOUT_KIND};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use stats::{ParticipantAggregate, ParticipantMetrics};
