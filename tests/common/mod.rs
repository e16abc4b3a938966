// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{Duration, Utc};
use relay_leaderboard::config::Config;
use relay_leaderboard::db::MemoryStore;
use relay_leaderboard::models::{ActivityCategory, Competition, RawEvent, ScoringType, WORKOUT_KIND};
use relay_leaderboard::relay::MockTransport;
use relay_leaderboard::routes::create_router;
use relay_leaderboard::services::parser::compute_event_id;
use relay_leaderboard::services::CompetitionRegistry;
use relay_leaderboard::AppState;
use std::sync::Arc;

/// Relay URL used by `Config::test_default`.
#[allow(dead_code)]
pub const RELAY: &str = "wss://relay.test";

/// Unix timestamp `days` days before now.
#[allow(dead_code)]
pub fn days_ago(days: i64) -> i64 {
    (Utc::now() - Duration::days(days)).timestamp()
}

/// A signed-shape workout event with a correct id.
#[allow(dead_code)]
pub fn workout(pubkey: &str, created_at: i64, exercise: &str, km: f64, duration: &str) -> RawEvent {
    let mut event = RawEvent {
        id: String::new(),
        pubkey: pubkey.to_string(),
        created_at,
        kind: WORKOUT_KIND,
        tags: vec![
            vec!["exercise".to_string(), exercise.to_string()],
            vec!["distance".to_string(), km.to_string(), "km".to_string()],
            vec!["duration".to_string(), duration.to_string()],
        ],
        content: format!("{km} km {exercise}"),
        sig: String::new(),
    };
    event.id = compute_event_id(&event);
    event
}

/// A running competition covering the last 30 days.
#[allow(dead_code)]
pub fn competition(id: &str, team: Option<&str>, members: &[&str]) -> Competition {
    Competition {
        id: id.to_string(),
        name: format!("Competition {id}"),
        team_id: team.map(str::to_string),
        activity: ActivityCategory::Running,
        scoring: ScoringType::TotalDistance,
        count_weight: None,
        start: Utc::now() - Duration::days(30),
        end: Utc::now() + Duration::days(1),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

#[allow(dead_code)]
pub fn registry(competitions: Vec<Competition>) -> CompetitionRegistry {
    let registry = CompetitionRegistry::new();
    for competition in competitions {
        registry
            .upsert(competition)
            .expect("Failed to register test competition");
    }
    registry
}

/// Create a test app over the given mock relays.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(
    transport: MockTransport,
    competitions: CompetitionRegistry,
) -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default(), transport, competitions)
}

#[allow(dead_code)]
pub fn create_test_app_with_config(
    config: Config,
    transport: MockTransport,
    competitions: CompetitionRegistry,
) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        config,
        Arc::new(transport),
        Arc::new(MemoryStore::new()),
        competitions,
    ));
    (create_router(state.clone()), state)
}
