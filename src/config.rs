// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The Supabase endpoint, anon key and JWT secret are opaque external
//! configuration; everything else has a sensible default.

use std::env;
use std::time::Duration;

/// Default interval between `readings` refreshes while a view is mounted.
pub const DEFAULT_READINGS_POLL_MS: u64 = 5_000;
/// Jobs change state more often than content, so they poll faster.
pub const DEFAULT_JOBS_POLL_MS: u64 = 3_000;
/// How long the gate waits for profile/subscription before answering "loading".
pub const DEFAULT_GATE_WAIT_MS: u64 = 1_500;
/// Snapshots younger than this are served from cache without a refetch.
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 30;
/// Unwatched cache entries idle this long are dropped by the sweeper.
pub const DEFAULT_CACHE_IDLE_SECS: u64 = 600;
/// Sessions with no request for this long are forgotten.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 3_600;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Supabase project URL (e.g. https://xyz.supabase.co)
    pub supabase_url: String,
    /// Supabase anon (public) API key
    pub supabase_anon_key: String,
    /// Secret used by Supabase Auth to sign access tokens (raw bytes)
    pub supabase_jwt_secret: Vec<u8>,
    /// Frontend URL for CORS and password-reset redirects
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    pub readings_poll_interval: Duration,
    pub jobs_poll_interval: Duration,
    pub gate_wait: Duration,
    pub cache_max_age: Duration,
    pub cache_idle: Duration,
    pub session_idle: Duration,
    /// PostHog project key; capture is disabled when unset
    pub posthog_key: Option<String>,
    pub posthog_host: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            supabase_url: "http://127.0.0.1:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            supabase_jwt_secret: b"test_jwt_secret_32_bytes_minimum!".to_vec(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            readings_poll_interval: Duration::from_millis(DEFAULT_READINGS_POLL_MS),
            jobs_poll_interval: Duration::from_millis(DEFAULT_JOBS_POLL_MS),
            gate_wait: Duration::from_millis(DEFAULT_GATE_WAIT_MS),
            cache_max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
            cache_idle: Duration::from_secs(DEFAULT_CACHE_IDLE_SECS),
            session_idle: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            posthog_key: None,
            posthog_host: "https://app.posthog.com".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?
                .trim()
                .as_bytes()
                .to_vec(),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            readings_poll_interval: Duration::from_millis(parse_or(
                "READINGS_POLL_MS",
                DEFAULT_READINGS_POLL_MS,
            )?),
            jobs_poll_interval: Duration::from_millis(parse_or(
                "JOBS_POLL_MS",
                DEFAULT_JOBS_POLL_MS,
            )?),
            gate_wait: Duration::from_millis(parse_or("GATE_WAIT_MS", DEFAULT_GATE_WAIT_MS)?),
            cache_max_age: Duration::from_secs(parse_or(
                "CACHE_MAX_AGE_SECS",
                DEFAULT_CACHE_MAX_AGE_SECS,
            )?),
            cache_idle: Duration::from_secs(parse_or("CACHE_IDLE_SECS", DEFAULT_CACHE_IDLE_SECS)?),
            session_idle: Duration::from_secs(parse_or(
                "SESSION_IDLE_SECS",
                DEFAULT_SESSION_IDLE_SECS,
            )?),
            posthog_key: env::var("POSTHOG_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            posthog_host: env::var("POSTHOG_HOST")
                .unwrap_or_else(|_| "https://app.posthog.com".to_string()),
        })
    }

    /// Whether session cookies should carry the `Secure` attribute.
    ///
    /// Plain-http frontends (local development) cannot receive secure cookies.
    pub fn cookie_secure(&self) -> bool {
        !self.frontend_url.starts_with("http://")
    }

    /// Where the auth provider should send users from the reset email.
    pub fn password_reset_redirect(&self) -> String {
        format!(
            "{}/reset-password",
            self.frontend_url.trim_end_matches('/')
        )
    }
}

fn parse_or(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
