// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Multi-strategy record discovery.
//!
//! Any single relay query may return only part of what a relay stores, so a
//! discovery run queries a participant's history in two tiers:
//!
//! 1. Time-partitioned windows, newest to oldest, each with its own limit.
//! 2. If that found fewer records than the sufficiency threshold, the same
//!    filter with no time bound at ascending limits.
//!
//! Every query goes to all configured relays. One seen-id set spans the whole
//! run, so a record returned by several windows, tiers, or relays counts once.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::executor::QueryExecutor;
use super::parser::RecordParser;
use crate::config::DiscoveryConfig;
use crate::models::{ActivityRecord, QueryFilter};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// One slice of history queried by the partitioned tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub label: String,
    /// Newer edge, in days before now
    pub newer_days: u32,
    /// Older edge, in days before now; `None` reaches back to the beginning
    pub older_days: Option<u32>,
    pub limit: usize,
}

impl TimeWindow {
    pub fn new(newer_days: u32, older_days: Option<u32>, limit: usize) -> Self {
        let label = match older_days {
            Some(older) => format!("{newer_days}-{older}d"),
            None => format!("{newer_days}d-beginning"),
        };
        Self {
            label,
            newer_days,
            older_days,
            limit,
        }
    }

    /// 0–7d, 7–14d, 14–30d, 30–90d, 90–365d, 365d–beginning.
    pub fn default_schedule() -> Vec<TimeWindow> {
        vec![
            TimeWindow::new(0, Some(7), 100),
            TimeWindow::new(7, Some(14), 100),
            TimeWindow::new(14, Some(30), 150),
            TimeWindow::new(30, Some(90), 200),
            TimeWindow::new(90, Some(365), 300),
            TimeWindow::new(365, None, 500),
        ]
    }

    /// Inclusive `(since, until)` bounds relative to `now`.
    ///
    /// Adjacent windows never overlap. The newest window has no upper
    /// bound so records with slightly skewed clocks are not missed.
    pub fn bounds(&self, now: i64) -> (Option<i64>, Option<i64>) {
        let since = self
            .older_days
            .map(|days| now - i64::from(days) * SECS_PER_DAY);
        let until = if self.newer_days == 0 {
            None
        } else {
            Some(now - i64::from(self.newer_days) * SECS_PER_DAY - 1)
        };
        (since, until)
    }
}

/// Counters for one query step (one window, one fallback limit, or one page).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepTelemetry {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    pub limit: usize,
    /// Events returned by all relays, before deduplication
    pub raw_events: usize,
    /// Records this step contributed to the result
    pub new_records: usize,
    pub duplicates: usize,
    pub failed_relays: usize,
    pub dropped_after_deadline: usize,
}

/// Records found per tier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyBreakdown {
    pub partitioned: usize,
    pub fallback: usize,
    pub pagination: usize,
}

/// What happened during one discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryTelemetry {
    pub participant_id: String,
    pub total_found: usize,
    pub per_strategy: StrategyBreakdown,
    pub windows: Vec<StepTelemetry>,
    pub fallback_steps: Vec<StepTelemetry>,
    pub fallback_used: bool,
    pub duplicates: usize,
    pub parse_failures: usize,
    pub validation_failures: usize,
    /// Valid records outside the requested range or by another author
    pub filtered_out: usize,
    pub failed_queries: usize,
    pub dropped_after_deadline: usize,
    pub elapsed_ms: u64,
}

/// Deduplicated, validated records plus telemetry. Records are newest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryResult {
    pub records: Vec<ActivityRecord>,
    pub telemetry: DiscoveryTelemetry,
}

/// Discovers a participant's activity records across all relays.
#[derive(Clone)]
pub struct DiscoveryEngine {
    executor: QueryExecutor,
    parser: Arc<dyn RecordParser>,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(executor: QueryExecutor, parser: Arc<dyn RecordParser>, config: DiscoveryConfig) -> Self {
        Self {
            executor,
            parser,
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Find every record by `participant`, optionally only from `since` on.
    ///
    /// Relay failures are counted in telemetry and never abort the run.
    pub async fn discover(&self, participant: &str, since: Option<DateTime<Utc>>) -> DiscoveryResult {
        let started = Instant::now();
        let now = Utc::now().timestamp();
        let since_ts = since.map(|s| s.timestamp());
        let mut run = DiscoveryRun::new(self, participant, since_ts, None);

        // Tier 1: newest to oldest.
        for window in &self.config.windows {
            let (window_since, until) = window.bounds(now);
            if let (Some(floor), Some(until)) = (since_ts, until) {
                if until < floor {
                    break;
                }
            }
            let window_since = match (window_since, since_ts) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };

            let filter = self
                .base_filter(participant)
                .since(window_since)
                .until(until)
                .limit(window.limit);
            let step = run.step(&window.label, filter).await;
            run.telemetry.per_strategy.partitioned += step.new_records;
            run.telemetry.windows.push(step);
        }

        // Tier 2: unbounded, filtered client-side against `since`.
        let partitioned = run.telemetry.per_strategy.partitioned;
        if partitioned < self.config.sufficiency_threshold {
            tracing::debug!(
                participant,
                partitioned,
                threshold = self.config.sufficiency_threshold,
                "Partitioned tier below threshold, running unbounded fallback"
            );
            run.telemetry.fallback_used = true;
            for &limit in &self.config.fallback_limits {
                let filter = self.base_filter(participant).limit(limit);
                let step = run.step(&format!("unbounded-{limit}"), filter).await;
                run.telemetry.per_strategy.fallback += step.new_records;
                run.telemetry.fallback_steps.push(step);
            }
        }

        let result = run.finish(started);
        tracing::info!(
            participant,
            total = result.telemetry.total_found,
            partitioned = result.telemetry.per_strategy.partitioned,
            fallback = result.telemetry.per_strategy.fallback,
            duplicates = result.telemetry.duplicates,
            failed_queries = result.telemetry.failed_queries,
            elapsed_ms = result.telemetry.elapsed_ms,
            "Discovery finished"
        );
        result
    }

    /// One page of records strictly older than `until`.
    pub async fn load_older(&self, participant: &str, until: DateTime<Utc>, limit: usize) -> DiscoveryResult {
        let started = Instant::now();
        let until_ts = until.timestamp() - 1;
        let mut run = DiscoveryRun::new(self, participant, None, Some(until_ts));

        let filter = self
            .base_filter(participant)
            .until(Some(until_ts))
            .limit(limit);
        let step = run.step("older", filter).await;
        run.telemetry.per_strategy.pagination += step.new_records;
        run.telemetry.windows.push(step);

        let mut result = run.finish(started);
        result.records.truncate(limit);
        result.telemetry.total_found = result.records.len();
        result
    }

    fn base_filter(&self, participant: &str) -> QueryFilter {
        QueryFilter::for_author(participant, &self.config.record_kinds)
    }
}

/// State shared by every step of one discovery run.
struct DiscoveryRun<'a> {
    engine: &'a DiscoveryEngine,
    participant: &'a str,
    since: Option<i64>,
    until: Option<i64>,
    seen: HashSet<String>,
    records: Vec<ActivityRecord>,
    telemetry: DiscoveryTelemetry,
    steps_run: usize,
}

impl<'a> DiscoveryRun<'a> {
    fn new(
        engine: &'a DiscoveryEngine,
        participant: &'a str,
        since: Option<i64>,
        until: Option<i64>,
    ) -> Self {
        Self {
            engine,
            participant,
            since,
            until,
            seen: HashSet::new(),
            records: Vec::new(),
            telemetry: DiscoveryTelemetry {
                participant_id: participant.to_string(),
                ..DiscoveryTelemetry::default()
            },
            steps_run: 0,
        }
    }

    /// Query every relay with `filter` and fold the results in.
    async fn step(&mut self, label: &str, filter: QueryFilter) -> StepTelemetry {
        let config = &self.engine.config;
        if self.steps_run > 0 && !config.window_pause.is_zero() {
            tokio::time::sleep(config.window_pause).await;
        }
        self.steps_run += 1;

        let mut step = StepTelemetry {
            label: label.to_string(),
            since: filter.since,
            until: filter.until,
            limit: filter.limit.unwrap_or_default(),
            ..StepTelemetry::default()
        };

        let executor = &self.engine.executor;
        let queries = config
            .relays
            .iter()
            .map(|relay| executor.run(relay, &filter, config.query_timeout));
        let results = join_all(queries).await;

        for (relay, result) in config.relays.iter().zip(results) {
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(relay = %relay, step = label, error = %e, "Relay query failed");
                    step.failed_relays += 1;
                    continue;
                }
            };
            if result.transport_error.is_some() {
                step.failed_relays += 1;
            }
            step.dropped_after_deadline += result.dropped_after_deadline;
            step.raw_events += result.records.len();

            for event in result.records {
                if !self.seen.insert(event.id.clone()) {
                    step.duplicates += 1;
                    continue;
                }

                let record = match self.engine.parser.parse(&event) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::debug!(event_id = %event.id, error = %e, "Discarding unparseable event");
                        self.telemetry.parse_failures += 1;
                        continue;
                    }
                };
                let issues = self.engine.parser.validate(&record);
                if !issues.is_empty() {
                    tracing::debug!(event_id = %event.id, ?issues, "Discarding invalid record");
                    self.telemetry.validation_failures += 1;
                    continue;
                }
                if !self.in_range(&record) {
                    self.telemetry.filtered_out += 1;
                    continue;
                }

                step.new_records += 1;
                self.records.push(record);
            }
        }

        self.telemetry.duplicates += step.duplicates;
        self.telemetry.failed_queries += step.failed_relays;
        self.telemetry.dropped_after_deadline += step.dropped_after_deadline;
        step
    }

    fn in_range(&self, record: &ActivityRecord) -> bool {
        let ts = record.timestamp.timestamp();
        record.participant_id == self.participant
            && self.since.is_none_or(|since| ts >= since)
            && self.until.is_none_or(|until| ts <= until)
    }

    fn finish(mut self, started: Instant) -> DiscoveryResult {
        self.records
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.telemetry.total_found = self.records.len();
        self.telemetry.elapsed_ms = started.elapsed().as_millis() as u64;
        DiscoveryResult {
            records: self.records,
            telemetry: self.telemetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_do_not_overlap() {
        let now = 1_000 * SECS_PER_DAY;
        let schedule = TimeWindow::default_schedule();

        let (since0, until0) = schedule[0].bounds(now);
        assert_eq!(until0, None);
        assert_eq!(since0, Some(now - 7 * SECS_PER_DAY));

        for pair in schedule.windows(2) {
            let (newer_since, _) = pair[0].bounds(now);
            let (_, older_until) = pair[1].bounds(now);
            assert_eq!(older_until, newer_since.map(|s| s - 1));
        }

        let (last_since, _) = schedule[5].bounds(now);
        assert_eq!(last_since, None);
    }

    #[test]
    fn test_window_labels() {
        assert_eq!(TimeWindow::new(0, Some(7), 100).label, "0-7d");
        assert_eq!(TimeWindow::new(365, None, 500).label, "365d-beginning");
    }
}
