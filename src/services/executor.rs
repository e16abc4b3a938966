// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Time-bounded relay queries.
//!
//! Relays are known to signal end-of-stored-events early and then keep
//! delivering, so a query always collects for the full timeout and treats
//! EOSE as informational. The only early exits are a relay-side CLOSED or
//! the transport going away.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::pool::{ConnectionPool, PoolError, ReleaseOutcome};
use crate::models::{QueryFilter, RawEvent};
use crate::relay::{RelayConnection, SubscriptionMessage, Transport};

/// Upper bound on how long closing a subscription may take.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// What one relay returned for one filter.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub relay_url: String,
    /// Events collected before the deadline, in arrival order
    pub records: Vec<RawEvent>,
    /// Events that arrived after the deadline and were discarded
    pub dropped_after_deadline: usize,
    /// True when at least one record was collected
    pub succeeded: bool,
    /// Whether the relay sent EOSE at some point
    pub eose_received: bool,
    /// Set when the relay closed the subscription itself
    pub closed_reason: Option<String>,
    /// Set when the subscription could not be started or the stream ended
    pub transport_error: Option<String>,
    pub elapsed: Duration,
}

impl QueryResult {
    fn failed(relay_url: &str, error: String, elapsed: Duration) -> Self {
        Self {
            relay_url: relay_url.to_string(),
            transport_error: Some(error),
            elapsed,
            ..Self::default()
        }
    }

    /// Health verdict for the connection that served this query.
    ///
    /// An empty result is not a connection fault.
    pub fn release_outcome(&self) -> ReleaseOutcome {
        if self.transport_error.is_some() || self.closed_reason.is_some() {
            ReleaseOutcome::Failed
        } else {
            ReleaseOutcome::Healthy
        }
    }
}

/// Collect events for `filter` until `timeout` elapses.
///
/// Returns no later than `timeout` plus the close grace period.
pub async fn execute(
    connection: &dyn RelayConnection,
    filter: &QueryFilter,
    timeout: Duration,
) -> QueryResult {
    let relay_url = connection.relay_url().to_string();
    let started = Instant::now();
    let deadline = started + timeout;

    let mut subscription = match tokio::time::timeout_at(deadline, connection.subscribe(filter)).await
    {
        Ok(Ok(sub)) => sub,
        Ok(Err(e)) => return QueryResult::failed(&relay_url, e.to_string(), started.elapsed()),
        Err(_) => {
            return QueryResult::failed(
                &relay_url,
                "subscribe timed out".to_string(),
                started.elapsed(),
            )
        }
    };

    let mut result = QueryResult {
        relay_url,
        ..QueryResult::default()
    };

    loop {
        match tokio::time::timeout_at(deadline, subscription.recv()).await {
            Err(_) => break,
            Ok(None) => {
                result.transport_error = Some("subscription stream ended".to_string());
                break;
            }
            Ok(Some(SubscriptionMessage::Event(event))) => {
                if Instant::now() >= deadline {
                    result.dropped_after_deadline += 1;
                } else {
                    result.records.push(event);
                }
            }
            Ok(Some(SubscriptionMessage::EndOfStoredEvents)) => {
                result.eose_received = true;
                tracing::trace!(
                    relay = %result.relay_url,
                    received = result.records.len(),
                    "EOSE received, still collecting"
                );
            }
            Ok(Some(SubscriptionMessage::Closed(reason))) => {
                tracing::debug!(relay = %result.relay_url, reason = %reason, "Relay closed subscription");
                result.closed_reason = Some(reason);
                break;
            }
        }
    }

    if tokio::time::timeout(CLOSE_GRACE, subscription.close())
        .await
        .is_err()
    {
        tracing::debug!(relay = %result.relay_url, "Subscription close timed out");
    }

    // Anything still buffered arrived too late to count.
    while let Some(message) = subscription.try_recv() {
        if matches!(message, SubscriptionMessage::Event(_)) {
            result.dropped_after_deadline += 1;
        }
    }

    result.succeeded = !result.records.is_empty();
    result.elapsed = started.elapsed();
    result
}

/// Runs queries through the connection pool.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: ConnectionPool,
    transport: Arc<dyn Transport>,
}

impl QueryExecutor {
    pub fn new(pool: ConnectionPool, transport: Arc<dyn Transport>) -> Self {
        Self { pool, transport }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Admit, lease a connection, execute, and release.
    ///
    /// Errors only when no connection could be obtained; a relay that
    /// returns nothing yields an empty, unsuccessful [`QueryResult`].
    pub async fn run(
        &self,
        relay_url: &str,
        filter: &QueryFilter,
        timeout: Duration,
    ) -> Result<QueryResult, PoolError> {
        let _permit = self.pool.admit().await?;

        let lease = match self.pool.acquire(relay_url).await {
            Some(lease) => lease,
            None => {
                let connection = self.transport.open(relay_url).await.map_err(|e| {
                    tracing::warn!(relay = relay_url, error = %e, "Relay connection failed");
                    PoolError::from(e)
                })?;
                self.pool.register(relay_url, connection)
            }
        };

        let result = execute(lease.connection(), filter, timeout).await;

        self.pool.record_query(
            result.elapsed,
            result.records.len(),
            result.dropped_after_deadline,
            result.succeeded,
        );
        tracing::debug!(
            relay = relay_url,
            records = result.records.len(),
            dropped = result.dropped_after_deadline,
            eose = result.eose_received,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Relay query finished"
        );

        self.pool.release(lease, result.release_outcome()).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::models::WORKOUT_KIND;
    use crate::relay::{MockRelay, MockTransport};

    fn event(id: &str, created_at: i64) -> RawEvent {
        RawEvent {
            id: id.to_string(),
            pubkey: "alice".to_string(),
            created_at,
            kind: WORKOUT_KIND,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_past_eose_until_timeout() {
        let relay = MockRelay {
            events: vec![event("stored", 10)],
            late_events: vec![(Duration::from_millis(300), event("late", 20))],
            ..MockRelay::default()
        };
        let transport = MockTransport::new().with_relay("wss://r", relay);
        let conn = transport.open("wss://r").await.unwrap();

        let filter = QueryFilter::for_author("alice", &[WORKOUT_KIND]);
        let result = execute(conn.as_ref(), &filter, Duration::from_secs(1)).await;

        let ids: Vec<&str> = result.records.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["stored", "late"]);
        assert!(result.eose_received);
        assert!(result.succeeded);
        assert!(result.elapsed >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_after_deadline_is_not_collected() {
        let relay = MockRelay {
            late_events: vec![(Duration::from_secs(5), event("too-late", 20))],
            ..MockRelay::default()
        };
        let transport = MockTransport::new().with_relay("wss://r", relay);
        let conn = transport.open("wss://r").await.unwrap();

        let filter = QueryFilter::for_author("alice", &[WORKOUT_KIND]);
        let result = execute(conn.as_ref(), &filter, Duration::from_secs(1)).await;

        assert!(result.records.is_empty());
        assert!(!result.succeeded);
        assert_eq!(result.release_outcome(), ReleaseOutcome::Healthy);
        assert!(result.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_run_reports_connection_failure() {
        let transport = MockTransport::new().with_relay("wss://down", MockRelay::failing());
        let executor = QueryExecutor::new(
            ConnectionPool::new(PoolConfig::default()),
            Arc::new(transport),
        );
        let filter = QueryFilter::for_author("alice", &[WORKOUT_KIND]);

        let result = executor
            .run("wss://down", &filter, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(PoolError::ConnectionFailed(_))));
        assert_eq!(executor.pool().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reuses_pooled_connection() {
        let transport = MockTransport::new()
            .with_relay("wss://r", MockRelay::with_events(vec![event("a", 1)]));
        let executor = QueryExecutor::new(
            ConnectionPool::new(PoolConfig::default()),
            Arc::new(transport.clone()),
        );
        let filter = QueryFilter::for_author("alice", &[WORKOUT_KIND]);

        for _ in 0..3 {
            let result = executor
                .run("wss://r", &filter, Duration::from_millis(100))
                .await
                .unwrap();
            assert_eq!(result.records.len(), 1);
        }
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.subscription_count(), 3);

        let metrics = executor.pool().metrics();
        assert_eq!(metrics.total_queries, 3);
        assert_eq!(metrics.success_rate, 1.0);
    }
}
