// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Milla gateway: access gate and reading progress for the Milla web app.
//!
//! This crate serves the app's page documents and JSON API in front of
//! Supabase. Every request resolves a session from cookies, pages are gated
//! by sign-in, onboarding and subscription, and reading generation progress
//! is polled from the data store and streamed to the browser.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::SupabaseDb;
use services::{Analytics, AuthClient, ProgressTracker, Queries, SessionStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SupabaseDb,
    pub auth: AuthClient,
    pub sessions: SessionStore,
    pub queries: Queries,
    pub progress: ProgressTracker,
    pub analytics: Analytics,
}

impl AppState {
    /// Build the state, sharing one HTTP connection pool across all clients.
    pub fn new(config: Config) -> Self {
        let http = reqwest::Client::new();
        let db = SupabaseDb::with_client(
            http.clone(),
            &config.supabase_url,
            &config.supabase_anon_key,
        );
        let auth = AuthClient::with_client(
            http.clone(),
            &config.supabase_url,
            &config.supabase_anon_key,
        );
        let analytics = Analytics::new(http, config.posthog_key.clone(), &config.posthog_host);
        let queries = Queries::new();
        let progress = ProgressTracker::new(db.clone(), &queries, &config);

        Self {
            config,
            db,
            auth,
            sessions: SessionStore::new(),
            queries,
            progress,
            analytics,
        }
    }
}
