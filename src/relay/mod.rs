// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Relay transport abstraction.
//!
//! A [`Transport`] opens connections to relay URLs, a [`RelayConnection`]
//! runs filtered subscriptions, and a [`Subscription`] yields messages
//! until it is closed. The pool and executor only ever talk to these
//! traits, so the production nostr-sdk transport and the offline mock are
//! interchangeable.

pub mod mock;
pub mod nostr;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::models::{QueryFilter, RawEvent};

pub use mock::{MockRelay, MockTransport};
pub use nostr::NostrTransport;

/// Lifecycle state of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Error,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// A message delivered on an open subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionMessage {
    Event(RawEvent),
    /// The relay claims it has no more stored records. Not trustworthy.
    EndOfStoredEvents,
    /// The relay closed the subscription with a reason.
    Closed(String),
}

/// Transport-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Subscription failed on {url}: {reason}")]
    Subscribe { url: String, reason: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Opens relay connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, relay_url: &str) -> Result<Arc<dyn RelayConnection>, TransportError>;
}

/// An established connection to one relay.
#[async_trait]
pub trait RelayConnection: Send + Sync {
    fn relay_url(&self) -> &str;

    fn state(&self) -> ConnectionState;

    /// Start a subscription for `filter`.
    async fn subscribe(
        &self,
        filter: &QueryFilter,
    ) -> Result<Box<dyn Subscription>, TransportError>;

    async fn disconnect(&self);
}

/// A live subscription. Messages keep arriving until [`Subscription::close`].
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `None` means the transport went away.
    async fn recv(&mut self) -> Option<SubscriptionMessage>;

    /// Take a message that is already buffered, without waiting.
    fn try_recv(&mut self) -> Option<SubscriptionMessage>;

    async fn close(&mut self);
}
