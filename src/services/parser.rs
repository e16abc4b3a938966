// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout event parsing and validation.
//!
//! Parsing turns a kind-1301 event into an [`ActivityRecord`]; validation
//! checks the record against domain rules. A record with any validation
//! issue is discarded by discovery, never partially admitted.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};

use crate::models::{ActivityCategory, ActivityRecord, RawEvent, WORKOUT_KIND};

/// How far in the future a workout timestamp may be before it is rejected.
const MAX_FUTURE_SKEW_SECS: i64 = 15 * 60;

const METERS_PER_MILE: f64 = 1609.344;

/// Longest duration a single workout may claim (30 days).
const MAX_DURATION_SECS: f64 = 30.0 * 24.0 * 3600.0;

/// Why an event could not be turned into a record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Unexpected event kind {0}")]
    WrongKind(u16),

    #[error("Event id does not match its content")]
    IdMismatch,

    #[error("Missing tag: {0}")]
    MissingTag(&'static str),

    #[error("Invalid number in {tag} tag: {value:?}")]
    InvalidNumber { tag: &'static str, value: String },

    #[error("Invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("Unknown distance unit: {0:?}")]
    UnknownUnit(String),

    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

/// A domain rule a parsed record breaks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("Negative duration")]
    NegativeDuration,

    #[error("Negative distance")]
    NegativeDistance,

    #[error("Non-finite {0}")]
    NonFinite(&'static str),

    #[error("Timestamp is in the future")]
    FutureTimestamp,

    #[error("Workout has neither distance nor duration")]
    Empty,
}

/// Turns raw relay events into validated activity records.
pub trait RecordParser: Send + Sync {
    fn parse(&self, event: &RawEvent) -> Result<ActivityRecord, ParseError>;

    fn validate(&self, record: &ActivityRecord) -> Vec<ValidationIssue>;
}

/// Parser for kind-1301 workout events.
#[derive(Debug, Clone)]
pub struct WorkoutParser {
    verify_ids: bool,
}

impl Default for WorkoutParser {
    fn default() -> Self {
        Self { verify_ids: true }
    }
}

impl WorkoutParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the event id check (for events built by hand).
    pub fn without_id_check() -> Self {
        Self { verify_ids: false }
    }
}

impl RecordParser for WorkoutParser {
    fn parse(&self, event: &RawEvent) -> Result<ActivityRecord, ParseError> {
        if event.kind != WORKOUT_KIND {
            return Err(ParseError::WrongKind(event.kind));
        }
        if self.verify_ids && compute_event_id(event) != event.id.to_ascii_lowercase() {
            return Err(ParseError::IdMismatch);
        }

        let category = event
            .tag_value("exercise")
            .or_else(|| event.tag_value("t"))
            .map(ActivityCategory::parse)
            .ok_or(ParseError::MissingTag("exercise"))?;

        let distance_meters = event.tag("distance").map(parse_distance).transpose()?;

        let duration_seconds = match event.tag_value("duration") {
            Some(raw) => parse_duration(raw)?,
            None => 0.0,
        };

        let calories = event
            .tag_value("calories")
            .map(|raw| parse_number("calories", raw))
            .transpose()?;

        let timestamp = DateTime::<Utc>::from_timestamp(event.created_at, 0)
            .ok_or(ParseError::InvalidTimestamp(event.created_at))?;

        Ok(ActivityRecord {
            event_id: event.id.clone(),
            participant_id: event.pubkey.clone(),
            category,
            distance_meters,
            duration_seconds,
            calories,
            timestamp,
        })
    }

    fn validate(&self, record: &ActivityRecord) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if !record.duration_seconds.is_finite() {
            issues.push(ValidationIssue::NonFinite("duration"));
        } else if record.duration_seconds < 0.0 {
            issues.push(ValidationIssue::NegativeDuration);
        }

        match record.distance_meters {
            Some(d) if !d.is_finite() => issues.push(ValidationIssue::NonFinite("distance")),
            Some(d) if d < 0.0 => issues.push(ValidationIssue::NegativeDistance),
            _ => {}
        }

        if record.calories.is_some_and(|c| !c.is_finite()) {
            issues.push(ValidationIssue::NonFinite("calories"));
        }

        if record.timestamp > Utc::now() + ChronoDuration::seconds(MAX_FUTURE_SKEW_SECS) {
            issues.push(ValidationIssue::FutureTimestamp);
        }

        let has_distance = record.distance_meters.is_some_and(|d| d > 0.0);
        if !has_distance && record.duration_seconds == 0.0 {
            issues.push(ValidationIssue::Empty);
        }

        issues
    }
}

/// NIP-01 event id: hex SHA-256 of `[0, pubkey, created_at, kind, tags, content]`.
pub fn compute_event_id(event: &RawEvent) -> String {
    let canonical = serde_json::json!([
        0,
        event.pubkey,
        event.created_at,
        event.kind,
        event.tags,
        event.content,
    ]);
    hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
}

fn parse_number(tag: &'static str, raw: &str) -> Result<f64, ParseError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            tag,
            value: raw.to_string(),
        })
}

/// `["distance", value, unit]`, unit defaulting to km.
fn parse_distance(tag: &[String]) -> Result<f64, ParseError> {
    let value = tag.get(1).ok_or(ParseError::MissingTag("distance"))?;
    let value = parse_number("distance", value)?;
    let unit = tag.get(2).map(|u| u.trim().to_ascii_lowercase());

    let factor = match unit.as_deref() {
        None | Some("") | Some("km") => 1000.0,
        Some("m") => 1.0,
        Some("mi") | Some("mile") | Some("miles") => METERS_PER_MILE,
        Some(other) => return Err(ParseError::UnknownUnit(other.to_string())),
    };
    Ok(value * factor)
}

/// `HH:MM:SS`, `MM:SS`, or plain seconds.
fn parse_duration(raw: &str) -> Result<f64, ParseError> {
    let raw = raw.trim();
    let invalid = || ParseError::InvalidDuration(raw.to_string());

    if !raw.contains(':') {
        let seconds = raw.parse::<f64>().map_err(|_| invalid())?;
        if seconds.is_finite() && seconds > MAX_DURATION_SECS {
            return Err(invalid());
        }
        return Ok(seconds);
    }

    let parts: Vec<&str> = raw.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return Err(invalid()),
    };
    let hours: u64 = h.parse().map_err(|_| invalid())?;
    let minutes: u64 = m.parse().map_err(|_| invalid())?;
    let seconds: f64 = s.parse().map_err(|_| invalid())?;
    if (parts.len() == 3 && minutes >= 60) || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    let whole = hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        .ok_or_else(invalid)?;
    let total = whole as f64 + seconds;
    if total > MAX_DURATION_SECS {
        return Err(invalid());
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workout(tags: Vec<Vec<&str>>, created_at: i64) -> RawEvent {
        let mut event = RawEvent {
            id: String::new(),
            pubkey: "a".repeat(64),
            created_at,
            kind: WORKOUT_KIND,
            tags: tags
                .into_iter()
                .map(|t| t.into_iter().map(String::from).collect())
                .collect(),
            content: "Morning run".to_string(),
            sig: String::new(),
        };
        event.id = compute_event_id(&event);
        event
    }

    fn recent() -> i64 {
        Utc::now().timestamp() - 3600
    }

    #[test]
    fn test_parse_full_workout() {
        let event = workout(
            vec![
                vec!["exercise", "running"],
                vec!["distance", "5.00", "km"],
                vec!["duration", "00:30:00"],
                vec!["calories", "320"],
            ],
            recent(),
        );
        let parser = WorkoutParser::new();
        let record = parser.parse(&event).unwrap();

        assert_eq!(record.category, ActivityCategory::Running);
        assert_eq!(record.distance_meters, Some(5000.0));
        assert_eq!(record.duration_seconds, 1800.0);
        assert_eq!(record.calories, Some(320.0));
        assert_eq!(record.participant_id, event.pubkey);
        assert!(parser.validate(&record).is_empty());
    }

    fn tag(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_distance_units() {
        assert_eq!(parse_distance(&tag(&["distance", "800", "m"])), Ok(800.0));
        assert_eq!(parse_distance(&tag(&["distance", "2"])), Ok(2000.0));
        assert_eq!(parse_distance(&tag(&["distance", "1", "mi"])), Ok(METERS_PER_MILE));
        assert!(matches!(
            parse_distance(&tag(&["distance", "1", "furlong"])),
            Err(ParseError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_duration_formats() {
        assert_eq!(parse_duration("01:02:03"), Ok(3723.0));
        assert_eq!(parse_duration("45:10"), Ok(2710.0));
        assert_eq!(parse_duration("900"), Ok(900.0));
        assert!(parse_duration("1:2:3:4").is_err());
        assert!(parse_duration("00:61:00").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn test_duration_rejects_overflow() {
        assert!(matches!(
            parse_duration("9999999999999999:00:00"),
            Err(ParseError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_duration("999999999999999999:00"),
            Err(ParseError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_duration("721:00:00"),
            Err(ParseError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_duration("1e300"),
            Err(ParseError::InvalidDuration(_))
        ));
        assert_eq!(parse_duration("720:00:00"), Ok(2_592_000.0));
    }

    #[test]
    fn test_huge_duration_tag_is_rejected() {
        let event = workout(
            vec![
                vec!["exercise", "running"],
                vec!["distance", "5", "km"],
                vec!["duration", "18446744073709551615:00:00"],
            ],
            recent(),
        );
        assert!(matches!(
            WorkoutParser::without_id_check().parse(&event),
            Err(ParseError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_tampered_event_rejected() {
        let mut event = workout(vec![vec!["exercise", "run"], vec!["duration", "600"]], recent());
        event.content = "edited".to_string();
        assert_eq!(WorkoutParser::new().parse(&event), Err(ParseError::IdMismatch));
        assert!(WorkoutParser::without_id_check().parse(&event).is_ok());
    }

    #[test]
    fn test_wrong_kind_and_missing_category() {
        let mut event = workout(vec![vec!["duration", "600"]], recent());
        assert_eq!(
            WorkoutParser::new().parse(&event),
            Err(ParseError::MissingTag("exercise"))
        );
        event.kind = 1;
        assert_eq!(WorkoutParser::new().parse(&event), Err(ParseError::WrongKind(1)));
    }

    #[test]
    fn test_validation_issues() {
        let parser = WorkoutParser::new();

        let negative = workout(vec![vec!["exercise", "run"], vec!["duration", "-60"]], recent());
        let record = parser.parse(&negative).unwrap();
        assert_eq!(parser.validate(&record), vec![ValidationIssue::NegativeDuration]);

        let future = workout(
            vec![vec!["exercise", "run"], vec!["duration", "60"]],
            Utc::now().timestamp() + 3600,
        );
        let record = parser.parse(&future).unwrap();
        assert_eq!(parser.validate(&record), vec![ValidationIssue::FutureTimestamp]);

        let empty = workout(vec![vec!["exercise", "run"]], recent());
        let record = parser.parse(&empty).unwrap();
        assert_eq!(parser.validate(&record), vec![ValidationIssue::Empty]);

        let nan = workout(
            vec![vec!["exercise", "run"], vec!["distance", "NaN", "km"], vec!["duration", "60"]],
            recent(),
        );
        let record = parser.parse(&nan).unwrap();
        assert_eq!(parser.validate(&record), vec![ValidationIssue::NonFinite("distance")]);
    }
}
