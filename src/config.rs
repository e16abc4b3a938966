//! Application configuration loaded from environment variables.
//!
//! Every knob has a default suitable for a small deployment; a `.env` file
//! is honoured for local development.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::WORKOUT_KIND;
use crate::services::discovery::TimeWindow;

/// Relays queried when `RELAYS` is unset.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.primal.net",
];

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// JSON file holding competition definitions
    pub competitions_path: String,
    /// Serve from the in-process mock transport instead of real relays
    pub offline: bool,
    /// JSON array of events every offline relay serves
    pub offline_events_path: String,
    pub pool: PoolConfig,
    pub discovery: DiscoveryConfig,
    pub cache: CacheConfig,
}

/// Connection pool limits.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pooled connections kept open at once
    pub max_connections: usize,
    /// Queries allowed to run at once
    pub max_concurrent_queries: usize,
    /// How long a queued query waits for capacity
    pub queue_timeout: Duration,
    /// Pooled connections unused this long are evicted
    pub idle_timeout: Duration,
    /// Consecutive failed queries before a connection is retired
    pub failure_threshold: u32,
    /// Period of the background sweeper
    pub sweep_interval: Duration,
    /// Relay connect timeout
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 2,
            max_concurrent_queries: 2,
            queue_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(5 * 60),
            failure_threshold: 3,
            sweep_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    /// Shortest queue timeout under which one aggregation pass never
    /// times out in the admission queue.
    ///
    /// Every participant task queries every relay at once, so the queue can
    /// hold `participant_concurrency * relays` requests, served
    /// `max_concurrent_queries` at a time. Each slot is held for at most a
    /// connect, a full query window, and a close.
    pub fn queue_floor(&self, discovery: &DiscoveryConfig) -> Duration {
        let backlog = discovery.participant_concurrency.max(1) * discovery.relays.len().max(1);
        let rounds = backlog.div_ceil(self.max_concurrent_queries.max(1));
        let slot_hold = self.connect_timeout + discovery.query_timeout + SLOT_CLOSE_MARGIN;
        slot_hold * rounds as u32
    }
}

/// Allowance per query slot for closing the subscription.
const SLOT_CLOSE_MARGIN: Duration = Duration::from_secs(1);

/// Record discovery strategy.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub relays: Vec<String>,
    /// Event kinds treated as activity records
    pub record_kinds: Vec<u16>,
    /// Time-partitioned windows, newest first
    pub windows: Vec<TimeWindow>,
    /// Limits for the unbounded fallback, smallest first
    pub fallback_limits: Vec<usize>,
    /// Partitioned results at or above this count skip the fallback
    pub sufficiency_threshold: usize,
    /// Per-query collection window
    pub query_timeout: Duration,
    /// Pause between consecutive window queries
    pub window_pause: Duration,
    /// Participants discovered concurrently during aggregation
    pub participant_concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            record_kinds: vec![WORKOUT_KIND],
            windows: TimeWindow::default_schedule(),
            fallback_limits: vec![50, 100, 200, 500],
            sufficiency_threshold: 20,
            query_timeout: Duration::from_secs(8),
            window_pause: Duration::from_millis(250),
            participant_concurrency: 4,
        }
    }
}

/// Leaderboard cache lifetimes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entries younger than this are served without refresh
    pub fresh_for: Duration,
    /// Entries younger than this are served while refreshing
    pub stale_for: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_for: Duration::from_secs(5 * 60),
            stale_for: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let pool_defaults = PoolConfig::default();
        let mut pool = PoolConfig {
            max_connections: parse_var("POOL_MAX_CONNECTIONS", pool_defaults.max_connections)?,
            max_concurrent_queries: parse_var(
                "POOL_MAX_CONCURRENT_QUERIES",
                pool_defaults.max_concurrent_queries,
            )?,
            queue_timeout: secs_var("QUEUE_TIMEOUT_SECS", pool_defaults.queue_timeout)?,
            idle_timeout: secs_var("POOL_IDLE_TIMEOUT_SECS", pool_defaults.idle_timeout)?,
            failure_threshold: parse_var(
                "POOL_FAILURE_THRESHOLD",
                pool_defaults.failure_threshold,
            )?,
            sweep_interval: secs_var("POOL_SWEEP_INTERVAL_SECS", pool_defaults.sweep_interval)?,
            connect_timeout: secs_var("CONNECT_TIMEOUT_SECS", pool_defaults.connect_timeout)?,
        };
        if pool.max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "POOL_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }
        if pool.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid {
                name: "POOL_MAX_CONCURRENT_QUERIES",
                value: "0".to_string(),
            });
        }

        let discovery_defaults = DiscoveryConfig::default();
        let relays = match env::var("RELAYS") {
            Ok(raw) => {
                let relays: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if relays.is_empty() {
                    return Err(ConfigError::Invalid {
                        name: "RELAYS",
                        value: raw,
                    });
                }
                relays
            }
            Err(_) => discovery_defaults.relays.clone(),
        };
        let discovery = DiscoveryConfig {
            relays,
            query_timeout: millis_var("QUERY_TIMEOUT_MS", discovery_defaults.query_timeout)?,
            window_pause: millis_var("WINDOW_PAUSE_MS", discovery_defaults.window_pause)?,
            sufficiency_threshold: parse_var(
                "SUFFICIENCY_THRESHOLD",
                discovery_defaults.sufficiency_threshold,
            )?,
            participant_concurrency: parse_var(
                "PARTICIPANT_CONCURRENCY",
                discovery_defaults.participant_concurrency,
            )?
            .max(1),
            ..discovery_defaults
        };

        let floor = pool.queue_floor(&discovery);
        if pool.queue_timeout < floor {
            tracing::warn!(
                configured_secs = pool.queue_timeout.as_secs(),
                floor_secs = floor.as_secs(),
                "Queue timeout too short for the discovery backlog, raising it"
            );
            pool.queue_timeout = floor;
        }

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            fresh_for: secs_var("CACHE_FRESH_SECS", cache_defaults.fresh_for)?,
            stale_for: secs_var("CACHE_STALE_SECS", cache_defaults.stale_for)?,
        };

        Ok(Self {
            port: parse_var("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            competitions_path: env::var("COMPETITIONS_PATH")
                .unwrap_or_else(|_| "data/competitions.json".to_string()),
            offline: parse_var("OFFLINE", false)?,
            offline_events_path: env::var("OFFLINE_EVENTS_PATH")
                .unwrap_or_else(|_| "data/offline_events.json".to_string()),
            pool,
            discovery,
            cache,
        })
    }

    /// Config for tests: one mock relay, short timeouts, no pauses.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            competitions_path: "data/competitions.json".to_string(),
            offline: true,
            offline_events_path: "data/offline_events.json".to_string(),
            pool: PoolConfig {
                queue_timeout: Duration::from_secs(5),
                ..PoolConfig::default()
            },
            discovery: DiscoveryConfig {
                relays: vec!["wss://relay.test".to_string()],
                query_timeout: Duration::from_millis(200),
                window_pause: Duration::ZERO,
                ..DiscoveryConfig::default()
            },
            cache: CacheConfig::default(),
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

fn millis_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(name, default.as_millis() as u64).map(Duration::from_millis)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
