// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for competitions, records, and cache control.

use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, Competition, Leaderboard, ParticipantMetrics};
use crate::services::{DiscoveryTelemetry, PoolMetrics};
use crate::time_utils::{format_utc_rfc3339, parse_rfc3339};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest page accepted by the older-records endpoint.
const MAX_OLDER_LIMIT: usize = 500;
const MAX_PARTICIPANT_ID_LEN: usize = 128;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/competitions", get(list_competitions))
        .route("/api/competitions/{id}", get(get_competition))
        .route(
            "/api/competitions/{id}/leaderboard",
            get(get_leaderboard),
        )
        .route("/api/participants/{id}/records", get(get_records))
        .route("/api/participants/{id}/records/older", get(get_older_records))
        .route("/api/participants/{id}/published", post(records_published))
        .route("/api/pool/metrics", get(get_pool_metrics))
        .route(
            "/api/cache/competitions/{id}",
            delete(invalidate_competition),
        )
        .route(
            "/api/cache/participants/{id}",
            delete(invalidate_participant),
        )
}

fn validate_participant_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.len() > MAX_PARTICIPANT_ID_LEN
        || !id.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AppError::BadRequest(
            "Invalid participant id: expected an alphanumeric public key".to_string(),
        ));
    }
    Ok(())
}

fn parse_timestamp_param(name: &str, raw: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    raw.map(|raw| {
        parse_rfc3339(raw).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid '{name}' parameter: must be RFC3339 datetime"
            ))
        })
    })
    .transpose()
}

// ─── Competitions ────────────────────────────────────────────

#[derive(Serialize)]
pub struct CompetitionSummary {
    pub id: String,
    pub name: String,
    pub team_id: Option<String>,
    pub activity: String,
    pub scoring: String,
    pub start: String,
    pub end: String,
    pub participants: usize,
}

impl From<Competition> for CompetitionSummary {
    fn from(c: Competition) -> Self {
        Self {
            participants: c.eligible_participants().len(),
            activity: c.activity.to_string(),
            scoring: c.scoring.to_string(),
            start: format_utc_rfc3339(c.start),
            end: format_utc_rfc3339(c.end),
            id: c.id,
            name: c.name,
            team_id: c.team_id,
        }
    }
}

async fn list_competitions(State(state): State<Arc<AppState>>) -> Json<Vec<CompetitionSummary>> {
    let summaries = state
        .competitions
        .list()
        .into_iter()
        .map(CompetitionSummary::from)
        .collect();
    Json(summaries)
}

async fn get_competition(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<String>,
) -> Result<Json<CompetitionSummary>> {
    state
        .competitions
        .get(&competition_id)
        .map(|c| Json(CompetitionSummary::from(c)))
        .ok_or_else(|| AppError::NotFound(format!("Competition {competition_id}")))
}

// ─── Leaderboards ────────────────────────────────────────────

#[derive(Deserialize)]
struct LeaderboardQuery {
    /// Bypass the cache and recompute
    #[serde(default)]
    refresh: bool,
}

#[derive(Serialize)]
pub struct LeaderboardRow {
    pub rank: u32,
    pub participant_id: String,
    pub score: f64,
    pub metrics: ParticipantMetrics,
    pub total_calories: f64,
    pub last_activity: Option<String>,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub competition_id: String,
    pub generated_at: String,
    pub total_records: u32,
    pub total_participants: u32,
    pub entries: Vec<LeaderboardRow>,
}

impl From<&Leaderboard> for LeaderboardResponse {
    fn from(leaderboard: &Leaderboard) -> Self {
        Self {
            competition_id: leaderboard.competition_id.clone(),
            generated_at: format_utc_rfc3339(leaderboard.generated_at),
            total_records: leaderboard.total_records,
            total_participants: leaderboard.total_participants,
            entries: leaderboard
                .entries
                .iter()
                .map(|e| LeaderboardRow {
                    rank: e.rank,
                    participant_id: e.participant_id.clone(),
                    score: e.score,
                    metrics: e.metrics,
                    total_calories: e.aggregate.total_calories,
                    last_activity: e.aggregate.last_activity.map(format_utc_rfc3339),
                })
                .collect(),
        }
    }
}

async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<String>,
    Query(params): Query<LeaderboardQuery>,
) -> Json<LeaderboardResponse> {
    tracing::debug!(
        competition = %competition_id,
        refresh = params.refresh,
        "Fetching leaderboard"
    );
    let leaderboard = state
        .leaderboards
        .get_leaderboard(&competition_id, params.refresh)
        .await;
    Json(LeaderboardResponse::from(leaderboard.as_ref()))
}

// ─── Records ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct RecordsQuery {
    /// Only records at or after this time (RFC3339)
    since: Option<String>,
}

#[derive(Deserialize)]
struct OlderRecordsQuery {
    /// Only records strictly before this time (RFC3339)
    until: Option<String>,
    #[serde(default = "default_older_limit")]
    limit: usize,
}

fn default_older_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct RecordSummary {
    pub event_id: String,
    pub category: String,
    pub distance_meters: Option<f64>,
    pub duration_seconds: f64,
    pub calories: Option<f64>,
    pub timestamp: String,
}

impl From<ActivityRecord> for RecordSummary {
    fn from(record: ActivityRecord) -> Self {
        Self {
            event_id: record.event_id,
            category: record.category.to_string(),
            distance_meters: record.distance_meters,
            duration_seconds: record.duration_seconds,
            calories: record.calories,
            timestamp: format_utc_rfc3339(record.timestamp),
        }
    }
}

#[derive(Serialize)]
pub struct RecordsResponse {
    pub participant_id: String,
    pub records: Vec<RecordSummary>,
    pub telemetry: DiscoveryTelemetry,
}

async fn get_records(
    State(state): State<Arc<AppState>>,
    Path(participant_id): Path<String>,
    Query(params): Query<RecordsQuery>,
) -> Result<Json<RecordsResponse>> {
    validate_participant_id(&participant_id)?;
    let since = parse_timestamp_param("since", params.since.as_deref())?;

    let result = state.discovery.discover(&participant_id, since).await;

    Ok(Json(RecordsResponse {
        participant_id,
        records: result.records.into_iter().map(RecordSummary::from).collect(),
        telemetry: result.telemetry,
    }))
}

async fn get_older_records(
    State(state): State<Arc<AppState>>,
    Path(participant_id): Path<String>,
    Query(params): Query<OlderRecordsQuery>,
) -> Result<Json<RecordsResponse>> {
    validate_participant_id(&participant_id)?;
    let until = parse_timestamp_param("until", params.until.as_deref())?
        .ok_or_else(|| AppError::BadRequest("Missing 'until' parameter".to_string()))?;
    if params.limit == 0 || params.limit > MAX_OLDER_LIMIT {
        return Err(AppError::BadRequest(format!(
            "Invalid 'limit' parameter: must be between 1 and {MAX_OLDER_LIMIT}"
        )));
    }

    let result = state
        .discovery
        .load_older(&participant_id, until, params.limit)
        .await;

    Ok(Json(RecordsResponse {
        participant_id,
        records: result.records.into_iter().map(RecordSummary::from).collect(),
        telemetry: result.telemetry,
    }))
}

// ─── Pool ────────────────────────────────────────────────────

async fn get_pool_metrics(State(state): State<Arc<AppState>>) -> Json<PoolMetrics> {
    Json(state.pool.metrics())
}

// ─── Cache Invalidation ──────────────────────────────────────

#[derive(Serialize)]
pub struct InvalidationResponse {
    pub removed: usize,
}

async fn invalidate_competition(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<String>,
) -> Json<InvalidationResponse> {
    let removed = state
        .leaderboards
        .invalidate_competition(&competition_id)
        .await;
    Json(InvalidationResponse { removed })
}

async fn invalidate_participant(
    State(state): State<Arc<AppState>>,
    Path(participant_id): Path<String>,
) -> Result<Json<InvalidationResponse>> {
    validate_participant_id(&participant_id)?;
    let removed = state
        .leaderboards
        .invalidate_participant(&participant_id)
        .await;
    Ok(Json(InvalidationResponse { removed }))
}

async fn records_published(
    State(state): State<Arc<AppState>>,
    Path(participant_id): Path<String>,
) -> Result<Json<InvalidationResponse>> {
    validate_participant_id(&participant_id)?;
    tracing::info!(participant = %participant_id, "Records published");
    let removed = state
        .leaderboards
        .notify_records_published(&participant_id)
        .await;
    Ok(Json(InvalidationResponse { removed }))
}
