// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wire-level relay records and query filters.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Kind used by published workout records.
pub const WORKOUT_KIND: u16 = 1301;

/// A record exactly as delivered by a relay (NIP-01 event shape).
///
/// Never mutated after it is received; the parser reads it and the
/// aggregation layer only ever sees the typed projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Hex-encoded SHA-256 identity assigned by the author
    pub id: String,
    /// Hex-encoded author public key
    pub pubkey: String,
    /// Unix timestamp (seconds)
    pub created_at: i64,
    pub kind: u16,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl RawEvent {
    /// First value of the first tag with the given name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tag(name).and_then(|t| t.get(1)).map(String::as_str)
    }

    /// The first tag with the given name, including its name.
    pub fn tag(&self, name: &str) -> Option<&[String]> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .map(Vec::as_slice)
    }
}

/// Immutable query description passed to a relay subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub authors: Vec<String>,
    pub kinds: Vec<u16>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<usize>,
    /// Single-letter tag constraints, e.g. `('t', ["running"])`
    #[serde(default)]
    pub tags: Vec<(char, Vec<String>)>,
}

impl QueryFilter {
    pub fn for_author(author: &str, kinds: &[u16]) -> Self {
        Self {
            authors: vec![author.to_string()],
            kinds: kinds.to_vec(),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: Option<i64>) -> Self {
        self.since = since;
        self
    }

    pub fn until(mut self, until: Option<i64>) -> Self {
        self.until = until;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn tag(mut self, letter: char, values: Vec<String>) -> Self {
        self.tags.push((letter, values));
        self
    }

    /// True when neither a lower nor an upper time bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// Check whether a record satisfies this filter (NIP-01 semantics,
    /// ignoring `limit`).
    pub fn matches(&self, event: &RawEvent) -> bool {
        if !self.authors.is_empty() && !self.authors.iter().any(|a| a == &event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if self.since.is_some_and(|s| event.created_at < s) {
            return false;
        }
        if self.until.is_some_and(|u| event.created_at > u) {
            return false;
        }
        self.tags.iter().all(|(letter, values)| {
            let name = letter.to_string();
            event.tags.iter().any(|t| {
                t.first() == Some(&name) && t.get(1).is_some_and(|v| values.contains(v))
            })
        })
    }

    /// Render as a NIP-01 `REQ` filter object.
    pub fn to_nip01_json(&self) -> Value {
        let mut obj = Map::new();
        if !self.authors.is_empty() {
            obj.insert("authors".into(), json!(self.authors));
        }
        if !self.kinds.is_empty() {
            obj.insert("kinds".into(), json!(self.kinds));
        }
        if let Some(since) = self.since {
            obj.insert("since".into(), json!(since));
        }
        if let Some(until) = self.until {
            obj.insert("until".into(), json!(until));
        }
        if let Some(limit) = self.limit {
            obj.insert("limit".into(), json!(limit));
        }
        for (letter, values) in &self.tags {
            obj.insert(format!("#{}", letter), json!(values));
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pubkey: &str, kind: u16, created_at: i64) -> RawEvent {
        RawEvent {
            id: "id".to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags: vec![vec!["t".to_string(), "running".to_string()]],
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn test_filter_matches_time_bounds_inclusive() {
        let filter = QueryFilter::for_author("alice", &[WORKOUT_KIND])
            .since(Some(100))
            .until(Some(200));

        assert!(filter.matches(&event("alice", WORKOUT_KIND, 100)));
        assert!(filter.matches(&event("alice", WORKOUT_KIND, 200)));
        assert!(!filter.matches(&event("alice", WORKOUT_KIND, 99)));
        assert!(!filter.matches(&event("alice", WORKOUT_KIND, 201)));
        assert!(!filter.matches(&event("bob", WORKOUT_KIND, 150)));
        assert!(!filter.matches(&event("alice", 1, 150)));
    }

    #[test]
    fn test_filter_tag_constraint() {
        let filter = QueryFilter::default().tag('t', vec!["running".to_string()]);
        assert!(filter.matches(&event("alice", WORKOUT_KIND, 1)));

        let filter = QueryFilter::default().tag('t', vec!["cycling".to_string()]);
        assert!(!filter.matches(&event("alice", WORKOUT_KIND, 1)));
    }

    #[test]
    fn test_nip01_json_omits_unset_fields() {
        let filter = QueryFilter::for_author("abc", &[WORKOUT_KIND]).limit(50);
        let json = filter.to_nip01_json();

        assert_eq!(json["authors"], json!(["abc"]));
        assert_eq!(json["kinds"], json!([1301]));
        assert_eq!(json["limit"], json!(50));
        assert!(json.get("since").is_none());
        assert!(json.get("until").is_none());
        assert!(filter.is_unbounded());
    }
}
