// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Production transport over nostr-sdk.
//!
//! Each [`RelayConnection`] owns a dedicated nostr-sdk `Client` with exactly
//! one relay added, so subscription traffic on one connection never mixes
//! with another relay's. Filters are handed to nostr-sdk as NIP-01 JSON.

use async_trait::async_trait;
use nostr_sdk::prelude::{Client, Filter, JsonUtil, RelayMessage, RelayPoolNotification};
use nostr_sdk::{Relay, RelayStatus, SubscriptionId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::{
    ConnectionState, RelayConnection, Subscription, SubscriptionMessage, Transport,
    TransportError,
};
use crate::models::{QueryFilter, RawEvent};

/// Interval between connection status polls while a relay is connecting.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transport that opens real websocket connections via nostr-sdk.
#[derive(Debug, Clone)]
pub struct NostrTransport {
    connect_timeout: Duration,
}

impl NostrTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for NostrTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Transport for NostrTransport {
    async fn open(&self, relay_url: &str) -> Result<Arc<dyn RelayConnection>, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            url: relay_url.to_string(),
            reason,
        };

        let client = Client::default();
        client
            .add_relay(relay_url)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        client.connect().await;

        // connect() returns immediately, so poll until the relay reports in.
        let deadline = tokio::time::Instant::now() + self.connect_timeout;
        let relay = loop {
            let connected = client
                .relays()
                .await
                .into_values()
                .find(|relay| relay.status() == RelayStatus::Connected);
            if let Some(relay) = connected {
                break relay;
            }
            if tokio::time::Instant::now() >= deadline {
                client.disconnect().await;
                return Err(connect_error(format!(
                    "not connected after {:?}",
                    self.connect_timeout
                )));
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        };

        tracing::debug!(relay = relay_url, "Relay connection established");

        Ok(Arc::new(NostrConnection {
            url: relay_url.to_string(),
            client,
            relay,
            fault: Mutex::new(None),
        }))
    }
}

/// Combine the live websocket status with any fault recorded locally.
///
/// A local fault sticks; otherwise the relay's own status decides, so a
/// dropped socket stops reporting `Connected` while nostr-sdk reconnects.
fn connection_state(status: RelayStatus, fault: Option<ConnectionState>) -> ConnectionState {
    if let Some(fault) = fault {
        return fault;
    }
    match status {
        RelayStatus::Connected => ConnectionState::Connected,
        RelayStatus::Initialized | RelayStatus::Pending | RelayStatus::Connecting => {
            ConnectionState::Connecting
        }
        RelayStatus::Terminated => ConnectionState::Closed,
        _ => ConnectionState::Error,
    }
}

/// One nostr-sdk client bound to a single relay.
struct NostrConnection {
    url: String,
    client: Client,
    relay: Relay,
    /// Set on a failed subscribe or an explicit disconnect
    fault: Mutex<Option<ConnectionState>>,
}

#[async_trait]
impl RelayConnection for NostrConnection {
    fn relay_url(&self) -> &str {
        &self.url
    }

    fn state(&self) -> ConnectionState {
        connection_state(self.relay.status(), *self.fault.lock())
    }

    async fn subscribe(
        &self,
        filter: &QueryFilter,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        let nip01 = filter.to_nip01_json().to_string();
        let filter =
            Filter::from_json(nip01).map_err(|e| TransportError::InvalidFilter(e.to_string()))?;

        // Take the receiver before subscribing so no early event is missed.
        let notifications = self.client.notifications();
        let output = self.client.subscribe(filter, None).await.map_err(|e| {
            *self.fault.lock() = Some(ConnectionState::Error);
            TransportError::Subscribe {
                url: self.url.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Box::new(NostrSubscription {
            relay_url: self.url.clone(),
            client: self.client.clone(),
            id: output.val,
            notifications,
        }))
    }

    async fn disconnect(&self) {
        *self.fault.lock() = Some(ConnectionState::Closed);
        self.client.disconnect().await;
    }
}

struct NostrSubscription {
    relay_url: String,
    client: Client,
    id: SubscriptionId,
    notifications: broadcast::Receiver<RelayPoolNotification>,
}

impl NostrSubscription {
    /// Map a pool notification to a subscription message, if it is ours.
    fn translate(&self, notification: RelayPoolNotification) -> Option<SubscriptionMessage> {
        match notification {
            RelayPoolNotification::Event {
                subscription_id,
                event,
                ..
            } => {
                if subscription_id != self.id {
                    return None;
                }
                match serde_json::from_str::<RawEvent>(&event.as_json()) {
                    Ok(raw) => Some(SubscriptionMessage::Event(raw)),
                    Err(e) => {
                        tracing::debug!(relay = %self.relay_url, error = %e, "Unreadable event");
                        None
                    }
                }
            }
            // One subscription per client at a time, so any EOSE/CLOSED is ours.
            RelayPoolNotification::Message { message, .. } => match message {
                RelayMessage::EndOfStoredEvents(_) => Some(SubscriptionMessage::EndOfStoredEvents),
                RelayMessage::Closed { message, .. } => {
                    Some(SubscriptionMessage::Closed(message.to_string()))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

#[async_trait]
impl Subscription for NostrSubscription {
    async fn recv(&mut self) -> Option<SubscriptionMessage> {
        loop {
            match self.notifications.recv().await {
                Ok(RelayPoolNotification::Shutdown) => return None,
                Ok(notification) => {
                    if let Some(message) = self.translate(notification) {
                        return Some(message);
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    tracing::warn!(relay = %self.relay_url, count, "Subscription receiver lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn try_recv(&mut self) -> Option<SubscriptionMessage> {
        loop {
            match self.notifications.try_recv() {
                Ok(notification) => {
                    if let Some(message) = self.translate(notification) {
                        return Some(message);
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.client.unsubscribe_all().await;
    }
}
