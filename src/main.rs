// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Relay-Leaderboard API Server
//!
//! Discovers workout events on Nostr relays and serves ranked competition
//! leaderboards.

use anyhow::Context;
use relay_leaderboard::{
    config::Config,
    db::MemoryStore,
    relay::{MockTransport, NostrTransport, Transport},
    services::CompetitionRegistry,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        relays = config.discovery.relays.len(),
        offline = config.offline,
        "Starting Relay-Leaderboard API"
    );

    // Load competition definitions
    tracing::info!(path = %config.competitions_path, "Loading competitions");
    let competitions = CompetitionRegistry::load_from_file(&config.competitions_path)
        .context("Failed to load competitions")?;

    let transport: Arc<dyn Transport> = if config.offline {
        let json_data = std::fs::read_to_string(&config.offline_events_path)
            .with_context(|| format!("Failed to read {}", config.offline_events_path))?;
        let events = MockTransport::events_from_json(&json_data)
            .context("Failed to parse offline events")?;
        tracing::warn!(
            path = %config.offline_events_path,
            events = events.len(),
            "Offline mode: using in-process mock relays"
        );
        Arc::new(MockTransport::seeded(&config.discovery.relays, &events))
    } else {
        Arc::new(NostrTransport::new(config.pool.connect_timeout))
    };

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        transport,
        Arc::new(MemoryStore::new()),
        competitions,
    ));

    let sweeper = state.pool.spawn_sweeper(config.pool.sweep_interval);

    // Build router
    let app = relay_leaderboard::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    sweeper.abort();
    state.pool.drain().await;
    Ok(())
}

/// Resolve on ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_leaderboard=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
