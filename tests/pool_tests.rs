// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection pool and query executor behaviour under load.

use futures_util::future::join_all;
use relay_leaderboard::config::PoolConfig;
use relay_leaderboard::models::QueryFilter;
use relay_leaderboard::relay::{MockRelay, MockTransport};
use relay_leaderboard::services::{ConnectionPool, PoolError, QueryExecutor};
use std::sync::Arc;
use std::time::Duration;

mod common;

const RELAYS: [&str; 3] = ["wss://a.test", "wss://b.test", "wss://c.test"];

fn transport_with_events() -> MockTransport {
    let mut transport = MockTransport::new();
    for relay in RELAYS {
        let events = vec![common::workout("alice", common::days_ago(1), "running", 5.0, "00:30:00")];
        transport = transport.with_relay(relay, MockRelay::with_events(events));
    }
    transport
}

#[tokio::test(start_paused = true)]
async fn test_burst_never_exceeds_pool_limits() {
    let transport = transport_with_events();
    let config = PoolConfig {
        max_connections: 2,
        max_concurrent_queries: 2,
        queue_timeout: Duration::from_secs(60),
        ..PoolConfig::default()
    };
    let pool = ConnectionPool::new(config);
    let executor = QueryExecutor::new(pool.clone(), Arc::new(transport.clone()));
    let filter = QueryFilter::for_author("alice", &[1301]);

    let queries = (0..20).map(|i| {
        let executor = executor.clone();
        let filter = filter.clone();
        let relay = RELAYS[i % RELAYS.len()];
        async move { executor.run(relay, &filter, Duration::from_millis(100)).await }
    });
    let results = join_all(queries).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(pool.pooled_count() <= 2);
    // Two pooled connections plus at most two single-use ones in flight.
    assert!(
        transport.max_open_connections() <= 4,
        "max open was {}",
        transport.max_open_connections()
    );
    assert_eq!(pool.in_flight(), 0);

    let metrics = pool.metrics();
    assert_eq!(metrics.total_queries, 20);
    assert_eq!(metrics.events_received, 20);
    assert_eq!(metrics.success_rate, 1.0);
    assert_eq!(metrics.queued_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_pooled_connection_is_reused() {
    let transport = transport_with_events();
    let pool = ConnectionPool::new(PoolConfig::default());
    let executor = QueryExecutor::new(pool.clone(), Arc::new(transport.clone()));
    let filter = QueryFilter::for_author("alice", &[1301]);

    for _ in 0..3 {
        executor
            .run(RELAYS[0], &filter, Duration::from_millis(50))
            .await
            .expect("query should run");
    }

    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.subscription_count(), 3);
    assert_eq!(pool.pooled_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_timeout_when_pool_is_saturated() {
    let relay = MockRelay {
        open_delay: Duration::from_secs(10),
        ..MockRelay::default()
    };
    let transport = MockTransport::new().with_relay(RELAYS[0], relay);
    let config = PoolConfig {
        max_concurrent_queries: 1,
        queue_timeout: Duration::from_secs(1),
        ..PoolConfig::default()
    };
    let pool = ConnectionPool::new(config);
    let executor = QueryExecutor::new(pool.clone(), Arc::new(transport));
    let filter = QueryFilter::for_author("alice", &[1301]);

    let slow = {
        let executor = executor.clone();
        let filter = filter.clone();
        tokio::spawn(async move { executor.run(RELAYS[0], &filter, Duration::from_millis(50)).await })
    };
    tokio::task::yield_now().await;

    let queued = executor.run(RELAYS[0], &filter, Duration::from_millis(50)).await;
    assert!(matches!(queued, Err(PoolError::QueueTimeout(_))));

    assert!(slow.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_failing_relay_surfaces_connection_error() {
    let transport = MockTransport::new().with_relay(RELAYS[0], MockRelay::failing());
    let pool = ConnectionPool::new(PoolConfig::default());
    let executor = QueryExecutor::new(pool.clone(), Arc::new(transport));

    let result = executor
        .run(RELAYS[0], &QueryFilter::default(), Duration::from_millis(50))
        .await;

    assert!(matches!(result, Err(PoolError::ConnectionFailed(_))));
    assert_eq!(pool.in_flight(), 0);
    assert_eq!(pool.pooled_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_drain_disconnects_pooled_connections() {
    let transport = transport_with_events();
    let pool = ConnectionPool::new(PoolConfig::default());
    let executor = QueryExecutor::new(pool.clone(), Arc::new(transport.clone()));
    let filter = QueryFilter::for_author("alice", &[1301]);

    for relay in &RELAYS[..2] {
        executor
            .run(relay, &filter, Duration::from_millis(50))
            .await
            .unwrap();
    }
    assert_eq!(transport.open_connections(), 2);

    pool.drain().await;
    assert_eq!(transport.open_connections(), 0);
    assert_eq!(pool.pooled_count(), 0);

    // The pool stays usable after draining.
    executor
        .run(RELAYS[0], &filter, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(pool.pooled_count(), 1);
}
