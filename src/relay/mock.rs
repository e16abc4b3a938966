// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process transport for offline mode and tests.
//!
//! Events are stored per relay URL and served with NIP-01 filter semantics
//! (newest first, truncated to `limit`). Each relay can be scripted to fail
//! connections, withhold results for time-bounded filters, or deliver
//! records after its end-of-stored-events signal, which is exactly the
//! misbehaviour the executor has to tolerate.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{
    ConnectionState, RelayConnection, Subscription, SubscriptionMessage, Transport,
    TransportError,
};
use crate::models::{QueryFilter, RawEvent};
use crate::services::parser::compute_event_id;

/// Scripted behaviour of one mock relay.
#[derive(Debug, Clone)]
pub struct MockRelay {
    pub events: Vec<RawEvent>,
    /// Refuse every connection attempt
    pub fail_open: bool,
    /// Delay before a connection attempt resolves
    pub open_delay: Duration,
    /// Delay before stored events start flowing
    pub delivery_delay: Duration,
    /// Send EOSE after the stored events
    pub send_eose: bool,
    /// Return nothing for filters with a `since` or `until` bound
    pub unbounded_only: bool,
    /// Events pushed after EOSE, each after its own delay
    pub late_events: Vec<(Duration, RawEvent)>,
}

impl Default for MockRelay {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            fail_open: false,
            open_delay: Duration::ZERO,
            delivery_delay: Duration::ZERO,
            send_eose: true,
            unbounded_only: false,
            late_events: Vec::new(),
        }
    }
}

impl MockRelay {
    pub fn with_events(events: Vec<RawEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Events matching `filter`, newest first, limited.
    fn select(&self, filter: &QueryFilter) -> Vec<RawEvent> {
        if self.unbounded_only && !filter.is_unbounded() {
            return Vec::new();
        }
        let mut matching: Vec<RawEvent> = self
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        matching
    }
}

#[derive(Default)]
struct MockState {
    relays: HashMap<String, MockRelay>,
    filters_seen: Vec<(String, QueryFilter)>,
}

#[derive(Default)]
struct MockCounters {
    opens: AtomicUsize,
    open_connections: AtomicUsize,
    max_open_connections: AtomicUsize,
    subscriptions: AtomicUsize,
}

/// Offline transport backed by in-memory relays.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    counters: Arc<MockCounters>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the same `events` from every relay in `relays`.
    pub fn seeded(relays: &[String], events: &[RawEvent]) -> Self {
        let transport = Self::new();
        for url in relays {
            transport.set_relay(url, MockRelay::with_events(events.to_vec()));
        }
        transport
    }

    /// Parse a JSON array of events. Ids are recomputed from the content,
    /// so fixtures may leave them empty.
    pub fn events_from_json(json_data: &str) -> Result<Vec<RawEvent>, serde_json::Error> {
        let mut events: Vec<RawEvent> = serde_json::from_str(json_data)?;
        for event in &mut events {
            event.id = compute_event_id(event);
        }
        Ok(events)
    }

    /// Install (or replace) the scripted relay at `url`.
    pub fn with_relay(self, url: &str, relay: MockRelay) -> Self {
        self.set_relay(url, relay);
        self
    }

    pub fn set_relay(&self, url: &str, relay: MockRelay) {
        self.state.lock().relays.insert(url.to_string(), relay);
    }

    /// Publish an event to a relay, creating the relay if needed.
    pub fn publish(&self, url: &str, event: RawEvent) {
        self.state
            .lock()
            .relays
            .entry(url.to_string())
            .or_default()
            .events
            .push(event);
    }

    /// Number of `open` calls made so far, including failed ones.
    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.counters.subscriptions.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet disconnected.
    pub fn open_connections(&self) -> usize {
        self.counters.open_connections.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously open connections.
    pub fn max_open_connections(&self) -> usize {
        self.counters.max_open_connections.load(Ordering::SeqCst)
    }

    /// Every (relay, filter) pair subscribed so far, in order.
    pub fn filters_seen(&self) -> Vec<(String, QueryFilter)> {
        self.state.lock().filters_seen.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, relay_url: &str) -> Result<Arc<dyn RelayConnection>, TransportError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        let relay = self.state.lock().relays.get(relay_url).cloned();
        let Some(relay) = relay else {
            return Err(TransportError::Connect {
                url: relay_url.to_string(),
                reason: "unknown relay".to_string(),
            });
        };

        if !relay.open_delay.is_zero() {
            tokio::time::sleep(relay.open_delay).await;
        }
        if relay.fail_open {
            return Err(TransportError::Connect {
                url: relay_url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let open = self.counters.open_connections.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_open_connections
            .fetch_max(open, Ordering::SeqCst);

        Ok(Arc::new(MockConnection {
            url: relay_url.to_string(),
            transport: self.clone(),
            state: Mutex::new(ConnectionState::Connected),
        }))
    }
}

struct MockConnection {
    url: String,
    transport: MockTransport,
    state: Mutex<ConnectionState>,
}

#[async_trait]
impl RelayConnection for MockConnection {
    fn relay_url(&self) -> &str {
        &self.url
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn subscribe(
        &self,
        filter: &QueryFilter,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::Subscribe {
                url: self.url.clone(),
                reason: format!("connection is {}", self.state()),
            });
        }

        let relay = {
            let mut state = self.transport.state.lock();
            state.filters_seen.push((self.url.clone(), filter.clone()));
            state.relays.get(&self.url).cloned().unwrap_or_default()
        };
        self.transport
            .counters
            .subscriptions
            .fetch_add(1, Ordering::SeqCst);

        let stored = relay.select(filter);
        let late: Vec<(Duration, RawEvent)> = relay
            .late_events
            .iter()
            .filter(|(_, e)| filter.matches(e))
            .cloned()
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            if !relay.delivery_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(relay.delivery_delay) => {}
                    _ = &mut close_rx => return,
                }
            }
            for event in stored {
                let _ = tx.send(SubscriptionMessage::Event(event));
            }
            if relay.send_eose {
                let _ = tx.send(SubscriptionMessage::EndOfStoredEvents);
            }
            for (delay, event) in late {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        let _ = tx.send(SubscriptionMessage::Event(event));
                    }
                    _ = &mut close_rx => return,
                }
            }
            // Relay subscriptions stay open until the client closes them.
            let _ = close_rx.await;
        });

        Ok(Box::new(MockSubscription {
            rx,
            close_tx: Some(close_tx),
        }))
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Closed {
            *state = ConnectionState::Closed;
            self.transport
                .counters
                .open_connections
                .fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct MockSubscription {
    rx: mpsc::UnboundedReceiver<SubscriptionMessage>,
    close_tx: Option<oneshot::Sender<()>>,
}

#[async_trait]
impl Subscription for MockSubscription {
    async fn recv(&mut self) -> Option<SubscriptionMessage> {
        self.rx.recv().await
    }

    fn try_recv(&mut self) -> Option<SubscriptionMessage> {
        self.rx.try_recv().ok()
    }

    async fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}
