// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Leaderboard fetch pipeline.
//!
//! A fetch resolves the competition's eligible participants, discovers each
//! participant's records, aggregates, and ranks. Results go through the
//! stale-while-revalidate cache. Failures never reach the caller: a fetch
//! that cannot complete yields an empty leaderboard.

use anyhow::Context;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::aggregation;
use super::cache::{self, CacheLookup, LeaderboardCache, RefreshGuard};
use super::competitions::CompetitionRegistry;
use super::discovery::DiscoveryEngine;
use crate::models::{ActivityRecord, Competition, Leaderboard};

/// Phases of a single leaderboard computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    ResolvingEligibility,
    DiscoveringRecords,
    Aggregating,
    Ranking,
    Cached,
    Served,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchPhase::Idle => "idle",
            FetchPhase::ResolvingEligibility => "resolving_eligibility",
            FetchPhase::DiscoveringRecords => "discovering_records",
            FetchPhase::Aggregating => "aggregating",
            FetchPhase::Ranking => "ranking",
            FetchPhase::Cached => "cached",
            FetchPhase::Served => "served",
        };
        f.write_str(name)
    }
}

/// Tracks the phase of one computation for logging.
struct FetchProgress<'a> {
    competition_id: &'a str,
    phase: FetchPhase,
}

impl<'a> FetchProgress<'a> {
    fn new(competition_id: &'a str) -> Self {
        Self {
            competition_id,
            phase: FetchPhase::Idle,
        }
    }

    fn enter(&mut self, phase: FetchPhase) {
        tracing::debug!(
            competition = self.competition_id,
            from = %self.phase,
            to = %phase,
            "Leaderboard fetch phase"
        );
        self.phase = phase;
    }
}

/// Computes, caches, and invalidates competition leaderboards.
#[derive(Clone)]
pub struct LeaderboardService {
    competitions: CompetitionRegistry,
    discovery: DiscoveryEngine,
    cache: LeaderboardCache,
    recomputations: Arc<AtomicU64>,
}

impl LeaderboardService {
    pub fn new(
        competitions: CompetitionRegistry,
        discovery: DiscoveryEngine,
        cache: LeaderboardCache,
    ) -> Self {
        Self {
            competitions,
            discovery,
            cache,
            recomputations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn cache(&self) -> &LeaderboardCache {
        &self.cache
    }

    /// Number of leaderboard computations completed since startup.
    pub fn recompute_count(&self) -> u64 {
        self.recomputations.load(Ordering::SeqCst)
    }

    /// Current leaderboard for `competition_id`.
    ///
    /// Fresh cache entries are returned as is. Stale entries are returned
    /// immediately and refreshed in the background. Missing or expired
    /// entries, or `force_refresh`, compute synchronously. Unknown
    /// competitions and failed computations yield an empty leaderboard.
    pub async fn get_leaderboard(&self, competition_id: &str, force_refresh: bool) -> Arc<Leaderboard> {
        let Some(competition) = self.competitions.get(competition_id) else {
            tracing::debug!(competition = competition_id, "Unknown competition");
            return Arc::new(Leaderboard::empty(competition_id));
        };
        let key = cache::leaderboard_key(&competition);

        if !force_refresh {
            match self.cache.lookup(&key).await {
                CacheLookup::Fresh(leaderboard) => {
                    tracing::debug!(competition = competition_id, "Serving fresh leaderboard");
                    return leaderboard;
                }
                CacheLookup::Stale {
                    leaderboard,
                    refresh,
                } => {
                    if let Some(guard) = refresh {
                        self.spawn_refresh(competition, guard);
                    }
                    tracing::debug!(competition = competition_id, "Serving stale leaderboard");
                    return leaderboard;
                }
                CacheLookup::Miss => {}
            }
        }

        match self.refresh(&competition, &key).await {
            Ok(leaderboard) => leaderboard,
            Err(e) => {
                tracing::error!(
                    competition = competition_id,
                    to = %FetchPhase::Served,
                    error = ?e,
                    "Leaderboard computation failed, serving empty"
                );
                Arc::new(Leaderboard::empty(competition_id))
            }
        }
    }

    /// Recompute in the background. The guard is held until the write lands.
    fn spawn_refresh(&self, competition: Competition, guard: RefreshGuard) {
        let service = self.clone();
        tokio::spawn(async move {
            match service.refresh(&competition, guard.key()).await {
                Ok(_) => {
                    tracing::info!(competition = %competition.id, "Background leaderboard refresh complete");
                }
                Err(e) => {
                    tracing::warn!(
                        competition = %competition.id,
                        error = ?e,
                        "Background leaderboard refresh failed"
                    );
                }
            }
            drop(guard);
        });
    }

    /// Compute and write to the cache under `key`.
    async fn refresh(&self, competition: &Competition, key: &str) -> anyhow::Result<Arc<Leaderboard>> {
        let leaderboard = self.recompute(competition).await?;
        let cached = self.cache.put(key, leaderboard).await;
        tracing::debug!(competition = %competition.id, to = %FetchPhase::Cached, "Leaderboard fetch phase");
        Ok(cached)
    }

    /// Run the full pipeline for one competition, bypassing the cache.
    pub async fn recompute(&self, competition: &Competition) -> anyhow::Result<Leaderboard> {
        let mut progress = FetchProgress::new(&competition.id);

        progress.enter(FetchPhase::ResolvingEligibility);
        let participants = competition.eligible_participants();

        progress.enter(FetchPhase::DiscoveringRecords);
        let records = self.discover_all(competition, &participants).await?;

        progress.enter(FetchPhase::Aggregating);
        let aggregates = aggregation::aggregate(competition, &participants, &records);

        progress.enter(FetchPhase::Ranking);
        let now = Utc::now();
        let leaderboard = aggregation::rank_aggregates(competition, aggregates, now.date_naive(), now);

        self.recomputations.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            competition = %competition.id,
            participants = leaderboard.total_participants,
            records = leaderboard.total_records,
            "Leaderboard computed"
        );
        Ok(leaderboard)
    }

    /// Discover records for every participant with bounded concurrency.
    ///
    /// Each discovery runs in its own task; a panicking task fails the
    /// whole computation instead of the process.
    async fn discover_all(
        &self,
        competition: &Competition,
        participants: &[String],
    ) -> anyhow::Result<Vec<ActivityRecord>> {
        let concurrency = self.discovery.config().participant_concurrency.max(1);
        let since = Some(competition.start);

        let results: Vec<_> = stream::iter(participants.iter().cloned())
            .map(|participant| {
                let discovery = self.discovery.clone();
                tokio::spawn(async move { discovery.discover(&participant, since).await })
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut records = Vec::new();
        for result in results {
            let result = result.context("discovery task failed")?;
            records.extend(result.records);
        }
        Ok(records)
    }

    /// Drop every cached leaderboard for `competition_id`.
    pub async fn invalidate_competition(&self, competition_id: &str) -> usize {
        self.cache
            .invalidate(&cache::competition_pattern(competition_id))
            .await
    }

    /// Drop every cached leaderboard that could include `participant_id`.
    ///
    /// Cascades to all competitions listing the participant and to every
    /// leaderboard of their teams.
    pub async fn invalidate_participant(&self, participant_id: &str) -> usize {
        let mut patterns = BTreeSet::new();
        for competition in self.competitions.competitions_for_participant(participant_id) {
            patterns.insert(cache::competition_pattern(&competition.id));
            if let Some(team) = &competition.team_id {
                patterns.insert(cache::team_pattern(team));
            }
        }

        let mut removed = 0;
        for pattern in &patterns {
            removed += self.cache.invalidate(pattern).await;
        }
        tracing::info!(
            participant = participant_id,
            patterns = patterns.len(),
            removed,
            "Participant leaderboards invalidated"
        );
        removed
    }

    /// New records were published by `participant_id`.
    pub async fn notify_records_published(&self, participant_id: &str) -> usize {
        self.invalidate_participant(participant_id).await
    }
}
