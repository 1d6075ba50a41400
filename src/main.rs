// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Milla gateway server
//!
//! Serves gated page documents, the account/content API and the reading
//! progress stream in front of Supabase.

use milla_gateway::{
    config::Config,
    services::{run_auth_listener, run_sweeper},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Milla gateway");

    let state = Arc::new(AppState::new(config.clone()));
    tracing::info!(
        analytics = state.analytics.is_enabled(),
        supabase = %config.supabase_url,
        "Clients initialized"
    );

    // Cache teardown and analytics identity follow auth events
    tokio::spawn(run_auth_listener(
        state.sessions.subscribe(),
        state.queries.clone(),
        state.analytics.clone(),
    ));

    // Idle sessions and unwatched cache entries are dropped in the background
    tokio::spawn(run_sweeper(
        state.sessions.clone(),
        state.queries.clone(),
        config.cache_idle,
        config.session_idle,
    ));

    // Build router
    let app = milla_gateway::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("milla_gateway=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
