// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Typed activity records parsed from relay events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a workout (running, cycling, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Running,
    Walking,
    Cycling,
    Hiking,
    Swimming,
    Strength,
    Other,
}

impl ActivityCategory {
    /// Parse a category name, accepting the common aliases published by clients.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" | "run" => Self::Running,
            "walking" | "walk" => Self::Walking,
            "cycling" | "cycle" | "bike" | "ride" => Self::Cycling,
            "hiking" | "hike" => Self::Hiking,
            "swimming" | "swim" => Self::Swimming,
            "strength" | "gym" => Self::Strength,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Walking => "walking",
            Self::Cycling => "cycling",
            Self::Hiking => "hiking",
            Self::Swimming => "swimming",
            Self::Strength => "strength",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed workout record.
///
/// Only records that passed parsing and validation exist as this type;
/// `duration_seconds` and `distance_meters` are never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Relay event ID this record was parsed from
    pub event_id: String,
    /// Author public key (hex)
    pub participant_id: String,
    pub category: ActivityCategory,
    /// Distance in meters, if the workout reported one
    pub distance_meters: Option<f64>,
    /// Duration in seconds
    pub duration_seconds: f64,
    pub calories: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    /// Pace in seconds per kilometer, when both fields are usable.
    pub fn pace_seconds_per_km(&self) -> Option<f64> {
        match self.distance_meters {
            Some(d) if d > 0.0 && self.duration_seconds > 0.0 => {
                Some(self.duration_seconds / (d / 1000.0))
            }
            _ => None,
        }
    }

    /// UTC calendar day of the workout.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_aliases() {
        assert_eq!(ActivityCategory::parse("Run"), ActivityCategory::Running);
        assert_eq!(ActivityCategory::parse(" bike "), ActivityCategory::Cycling);
        assert_eq!(ActivityCategory::parse("hike"), ActivityCategory::Hiking);
        assert_eq!(ActivityCategory::parse("yoga"), ActivityCategory::Other);
    }

    #[test]
    fn test_pace_requires_distance_and_duration() {
        let mut record = ActivityRecord {
            event_id: "e1".to_string(),
            participant_id: "alice".to_string(),
            category: ActivityCategory::Running,
            distance_meters: Some(5000.0),
            duration_seconds: 1500.0,
            calories: None,
            timestamp: Utc::now(),
        };
        assert_eq!(record.pace_seconds_per_km(), Some(300.0));

        record.distance_meters = None;
        assert_eq!(record.pace_seconds_per_km(), None);

        record.distance_meters = Some(5000.0);
        record.duration_seconds = 0.0;
        assert_eq!(record.pace_seconds_per_km(), None);
    }
}
