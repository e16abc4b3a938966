// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded relay connection pool with admission control.
//!
//! The pool keeps at most `max_connections` relay connections alive and lets
//! at most `max_concurrent_queries` queries run at once. Excess queries wait
//! in a FIFO queue with their own timeout.
//!
//! All mutable state (pooled entries, in-flight count, wait queue) lives
//! behind a single mutex. The lock is never held across an `.await`:
//! connections that need to be disconnected are collected under the lock
//! and disconnected after it is released.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::relay::{ConnectionState, RelayConnection, TransportError};

/// Errors surfaced by the pool to query callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[from] TransportError),

    #[error("Timed out after {0:?} waiting for query capacity")]
    QueueTimeout(Duration),

    #[error("Pool is draining")]
    Draining,
}

/// Whether the connection behaved during a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Healthy,
    Failed,
}

/// Pool-internal bookkeeping for one relay connection.
struct PooledConnection {
    connection: Arc<dyn RelayConnection>,
    last_used: Instant,
    query_count: u64,
    consecutive_failures: u32,
    active: bool,
    in_use: bool,
}

impl PooledConnection {
    fn is_evictable(&self, now: Instant, config: &PoolConfig) -> bool {
        !self.active
            || self.consecutive_failures >= config.failure_threshold
            || now.duration_since(self.last_used) >= config.idle_timeout
            || self.connection.state() != ConnectionState::Connected
    }
}

type Waiter = oneshot::Sender<Result<(), PoolError>>;

#[derive(Default)]
struct PoolState {
    entries: HashMap<String, PooledConnection>,
    in_flight: usize,
    waiters: VecDeque<Waiter>,
}

#[derive(Default)]
struct PoolStats {
    queries_total: AtomicU64,
    queries_succeeded: AtomicU64,
    response_time_ms_total: AtomicU64,
    events_received: AtomicU64,
    events_dropped: AtomicU64,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    stats: PoolStats,
}

impl PoolInner {
    /// Hand the slot to the next live waiter, or give it back.
    fn finish_query(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(Ok(())).is_ok() {
                return;
            }
        }
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Proof of admission. Dropping it frees the query slot.
pub struct QueryPermit {
    inner: Arc<PoolInner>,
}

impl Drop for QueryPermit {
    fn drop(&mut self) {
        self.inner.finish_query();
    }
}

/// A connection handed out for the duration of one query.
pub struct ConnectionLease {
    relay_url: String,
    connection: Arc<dyn RelayConnection>,
    pooled: bool,
}

impl ConnectionLease {
    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn connection(&self) -> &dyn RelayConnection {
        self.connection.as_ref()
    }

    /// `false` when the pool was full and this connection is single-use.
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }
}

/// Snapshot of pool health for the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    pub active_connections: usize,
    pub total_connections: usize,
    pub in_flight_queries: usize,
    pub queued_requests: usize,
    pub total_queries: u64,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub events_received: u64,
    pub events_dropped_after_deadline: u64,
}

/// Shared relay connection pool. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState::default()),
                stats: PoolStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    // ─── Admission ───────────────────────────────────────────────

    /// Wait for a query slot.
    ///
    /// Returns immediately when capacity is free; otherwise queues FIFO
    /// and fails with [`PoolError::QueueTimeout`] after `queue_timeout`.
    pub async fn admit(&self) -> Result<QueryPermit, PoolError> {
        let mut rx = {
            let mut state = self.inner.state.lock();
            while state.waiters.front().is_some_and(|w| w.is_closed()) {
                state.waiters.pop_front();
            }
            if state.in_flight < self.inner.config.max_concurrent_queries
                && state.waiters.is_empty()
            {
                state.in_flight += 1;
                return Ok(self.permit());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            tracing::debug!(
                queued = state.waiters.len(),
                in_flight = state.in_flight,
                "Query queued for pool capacity"
            );
            rx
        };

        let wait = self.inner.config.queue_timeout;
        match tokio::time::timeout(wait, &mut rx).await {
            Ok(Ok(Ok(()))) => Ok(self.permit()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(PoolError::Draining),
            Err(_) => {
                // A slot may have been handed over right as the timer fired.
                rx.close();
                match rx.try_recv() {
                    Ok(Ok(())) => Ok(self.permit()),
                    _ => {
                        tracing::warn!(waited = ?wait, "Query timed out waiting for pool capacity");
                        Err(PoolError::QueueTimeout(wait))
                    }
                }
            }
        }
    }

    fn permit(&self) -> QueryPermit {
        QueryPermit {
            inner: self.inner.clone(),
        }
    }

    // ─── Connections ─────────────────────────────────────────────

    /// Lease the pooled connection for `relay_url` if it is healthy.
    ///
    /// Unhealthy entries found here are evicted. Returns `None` when the
    /// caller must open a fresh connection.
    pub async fn acquire(&self, relay_url: &str) -> Option<ConnectionLease> {
        let now = Instant::now();
        let evicted = {
            let mut state = self.inner.state.lock();
            let entry = state.entries.get_mut(relay_url)?;
            if entry.in_use {
                return None;
            }
            if !entry.is_evictable(now, &self.inner.config) {
                entry.in_use = true;
                return Some(ConnectionLease {
                    relay_url: relay_url.to_string(),
                    connection: entry.connection.clone(),
                    pooled: true,
                });
            }
            state.entries.remove(relay_url)
        };

        if let Some(entry) = evicted {
            tracing::debug!(
                relay = relay_url,
                failures = entry.consecutive_failures,
                queries = entry.query_count,
                "Evicting unhealthy pooled connection"
            );
            entry.connection.disconnect().await;
        }
        None
    }

    /// Hand a freshly opened connection to the pool.
    ///
    /// The connection is pooled when there is room and no entry exists for
    /// the URL yet; otherwise it is leased for this query only and closed
    /// on release.
    pub fn register(&self, relay_url: &str, connection: Arc<dyn RelayConnection>) -> ConnectionLease {
        let mut state = self.inner.state.lock();
        let pooled = state.entries.len() < self.inner.config.max_connections
            && !state.entries.contains_key(relay_url);

        if pooled {
            state.entries.insert(
                relay_url.to_string(),
                PooledConnection {
                    connection: connection.clone(),
                    last_used: Instant::now(),
                    query_count: 0,
                    consecutive_failures: 0,
                    active: true,
                    in_use: true,
                },
            );
            tracing::debug!(relay = relay_url, size = state.entries.len(), "Connection pooled");
        } else {
            tracing::debug!(relay = relay_url, "Pool full, using single-use connection");
        }

        ConnectionLease {
            relay_url: relay_url.to_string(),
            connection,
            pooled,
        }
    }

    /// Return a lease after a query.
    pub async fn release(&self, lease: ConnectionLease, outcome: ReleaseOutcome) {
        let to_disconnect = if lease.pooled {
            let mut state = self.inner.state.lock();
            match state.entries.get_mut(&lease.relay_url) {
                Some(entry) if same_connection(&entry.connection, &lease.connection) => {
                    entry.in_use = false;
                    entry.last_used = Instant::now();
                    entry.query_count += 1;
                    match outcome {
                        ReleaseOutcome::Healthy => entry.consecutive_failures = 0,
                        ReleaseOutcome::Failed => entry.consecutive_failures += 1,
                    }
                    if entry.consecutive_failures >= self.inner.config.failure_threshold {
                        entry.active = false;
                        tracing::warn!(
                            relay = %lease.relay_url,
                            failures = entry.consecutive_failures,
                            "Pooled connection marked inactive"
                        );
                    }
                    None
                }
                // Entry was drained or replaced while leased.
                _ => Some(lease.connection),
            }
        } else {
            Some(lease.connection)
        };

        if let Some(connection) = to_disconnect {
            connection.disconnect().await;
        }
    }

    // ─── Maintenance ─────────────────────────────────────────────

    /// Evict every idle entry that is inactive, idle too long, or failing.
    ///
    /// Returns the number of evicted connections.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let evicted: Vec<(String, Arc<dyn RelayConnection>)> = {
            let mut state = self.inner.state.lock();
            let urls: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, e)| !e.in_use && e.is_evictable(now, &self.inner.config))
                .map(|(url, _)| url.clone())
                .collect();
            urls.into_iter()
                .filter_map(|url| state.entries.remove(&url).map(|e| (url, e.connection)))
                .collect()
        };

        for (url, connection) in &evicted {
            tracing::debug!(relay = %url, "Sweeping pooled connection");
            connection.disconnect().await;
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Pool sweep evicted connections");
        }
        evicted.len()
    }

    /// Disconnect everything and fail all queued requests.
    pub async fn drain(&self) {
        let (entries, waiters) = {
            let mut state = self.inner.state.lock();
            let entries: Vec<PooledConnection> = state.entries.drain().map(|(_, e)| e).collect();
            let waiters: Vec<Waiter> = state.waiters.drain(..).collect();
            (entries, waiters)
        };

        tracing::info!(
            connections = entries.len(),
            waiters = waiters.len(),
            "Draining connection pool"
        );

        for waiter in waiters {
            let _ = waiter.send(Err(PoolError::Draining));
        }
        for entry in entries {
            entry.connection.disconnect().await;
        }
    }

    /// Run [`ConnectionPool::sweep`] on a fixed interval until aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pool.sweep().await;
            }
        })
    }

    // ─── Metrics ─────────────────────────────────────────────────

    /// Record the outcome of one executed query.
    pub fn record_query(&self, elapsed: Duration, events: usize, dropped: usize, succeeded: bool) {
        let stats = &self.inner.stats;
        stats.queries_total.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            stats.queries_succeeded.fetch_add(1, Ordering::Relaxed);
        }
        stats
            .response_time_ms_total
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        stats.events_received.fetch_add(events as u64, Ordering::Relaxed);
        stats.events_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> PoolMetrics {
        let (active, total, in_flight, queued) = {
            let state = self.inner.state.lock();
            (
                state.entries.values().filter(|e| e.active).count(),
                state.entries.len(),
                state.in_flight,
                state.waiters.iter().filter(|w| !w.is_closed()).count(),
            )
        };

        let stats = &self.inner.stats;
        let total_queries = stats.queries_total.load(Ordering::Relaxed);
        let succeeded = stats.queries_succeeded.load(Ordering::Relaxed);
        let response_ms = stats.response_time_ms_total.load(Ordering::Relaxed);
        let (success_rate, avg_response_time_ms) = if total_queries > 0 {
            (
                succeeded as f64 / total_queries as f64,
                response_ms as f64 / total_queries as f64,
            )
        } else {
            (0.0, 0.0)
        };

        PoolMetrics {
            active_connections: active,
            total_connections: total,
            in_flight_queries: in_flight,
            queued_requests: queued,
            total_queries,
            success_rate,
            avg_response_time_ms,
            events_received: stats.events_received.load(Ordering::Relaxed),
            events_dropped_after_deadline: stats.events_dropped.load(Ordering::Relaxed),
        }
    }

    /// Number of pooled (registered) connections.
    pub fn pooled_count(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }
}

fn same_connection(a: &Arc<dyn RelayConnection>, b: &Arc<dyn RelayConnection>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
