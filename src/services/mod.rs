// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod aggregation;
pub mod cache;
pub mod competitions;
pub mod discovery;
pub mod executor;
pub mod leaderboard;
pub mod parser;
pub mod pool;
pub mod scoring;

pub use cache::LeaderboardCache;
pub use competitions::{CompetitionRegistry, RegistryError};
pub use discovery::{DiscoveryEngine, DiscoveryResult, DiscoveryTelemetry, TimeWindow};
pub use executor::{QueryExecutor, QueryResult};
pub use leaderboard::LeaderboardService;
pub use parser::{RecordParser, WorkoutParser};
pub use pool::{ConnectionPool, PoolError, PoolMetrics};
