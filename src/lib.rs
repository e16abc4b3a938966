// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Relay-Leaderboard: competition leaderboards from Nostr workout events
//!
//! This crate discovers workout records published to Nostr relays through a
//! bounded connection pool, then aggregates, scores, and ranks them into
//! cached competition leaderboards served over HTTP.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use relay::Transport;
use services::{
    CompetitionRegistry, ConnectionPool, DiscoveryEngine, LeaderboardCache, LeaderboardService,
    QueryExecutor, WorkoutParser,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub pool: ConnectionPool,
    pub discovery: DiscoveryEngine,
    pub leaderboards: LeaderboardService,
    pub competitions: CompetitionRegistry,
}

impl AppState {
    /// Wire the pool, discovery, and leaderboard services together.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        competitions: CompetitionRegistry,
    ) -> Self {
        let pool = ConnectionPool::new(config.pool.clone());
        let executor = QueryExecutor::new(pool.clone(), transport);
        let discovery = DiscoveryEngine::new(
            executor,
            Arc::new(WorkoutParser::new()),
            config.discovery.clone(),
        );
        let cache = LeaderboardCache::new(store, config.cache.clone());
        let leaderboards = LeaderboardService::new(competitions.clone(), discovery.clone(), cache);

        Self {
            config,
            pool,
            discovery,
            leaderboards,
            competitions,
        }
    }
}
