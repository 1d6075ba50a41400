// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-wide session state.
//!
//! The store records which users currently hold a session and broadcasts
//! every transition as an [`AuthEvent`]. Consumers subscribe instead of
//! polling shared state; [`run_auth_listener`] performs the teardown that
//! must follow a sign-out.

use crate::middleware::auth::AuthUser;
use crate::services::analytics::Analytics;
use crate::services::query_cache::Queries;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A valid token was seen for a user with no recorded session
    Restored { user_id: String },
    SignedIn { user_id: String },
    TokenRefreshed { user_id: String },
    SignedOut { user_id: String },
    /// No request carried the session for longer than the idle limit
    Expired { user_id: String },
}

impl AuthEvent {
    pub fn user_id(&self) -> &str {
        match self {
            AuthEvent::Restored { user_id }
            | AuthEvent::SignedIn { user_id }
            | AuthEvent::TokenRefreshed { user_id }
            | AuthEvent::SignedOut { user_id }
            | AuthEvent::Expired { user_id } => user_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub user_id: String,
    pub email: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SessionInfo {
    fn new(user: &AuthUser) -> Self {
        let now = Utc::now();
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            started_at: now,
            last_seen: now,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionInfo>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: Arc::new(DashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!(event = ?event, "Auth event");
        if self.events.send(event).is_err() {
            tracing::trace!("No auth event subscribers");
        }
    }

    /// Record a request made with a valid token.
    pub fn observe(&self, user: &AuthUser) {
        let mut restored = false;
        self.sessions
            .entry(user.user_id.clone())
            .and_modify(|session| session.last_seen = Utc::now())
            .or_insert_with(|| {
                restored = true;
                SessionInfo::new(user)
            });

        if restored {
            self.emit(AuthEvent::Restored {
                user_id: user.user_id.clone(),
            });
        }
    }

    pub fn signed_in(&self, user: &AuthUser) {
        self.sessions
            .insert(user.user_id.clone(), SessionInfo::new(user));
        self.emit(AuthEvent::SignedIn {
            user_id: user.user_id.clone(),
        });
    }

    pub fn refreshed(&self, user: &AuthUser) {
        self.sessions
            .entry(user.user_id.clone())
            .and_modify(|session| session.last_seen = Utc::now())
            .or_insert_with(|| SessionInfo::new(user));
        self.emit(AuthEvent::TokenRefreshed {
            user_id: user.user_id.clone(),
        });
    }

    /// Remove the session. Always notifies, so teardown runs even for a
    /// session this process never saw.
    pub fn sign_out(&self, user_id: &str) {
        self.sessions.remove(user_id);
        self.emit(AuthEvent::SignedOut {
            user_id: user_id.to_string(),
        });
    }

    /// Forget sessions last seen before `now - max_idle`.
    pub fn expire_idle(&self, now: DateTime<Utc>, max_idle: chrono::Duration) -> usize {
        let Some(cutoff) = now.checked_sub_signed(max_idle) else {
            return 0;
        };
        let mut expired = Vec::new();
        self.sessions.retain(|user_id, session| {
            let keep = session.last_seen >= cutoff;
            if !keep {
                expired.push(user_id.clone());
            }
            keep
        });

        let count = expired.len();
        for user_id in expired {
            self.emit(AuthEvent::Expired { user_id });
        }
        count
    }

    pub fn get(&self, user_id: &str) -> Option<SessionInfo> {
        self.sessions.get(user_id).map(|s| s.clone())
    }

    pub fn is_signed_in(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// React to auth transitions until the store is dropped.
///
/// Sign-in/restore identifies the user for analytics; sign-out evicts the
/// user's cached queries and resets the analytics identity.
pub async fn run_auth_listener(
    mut events: broadcast::Receiver<AuthEvent>,
    queries: Queries,
    analytics: Analytics,
) {
    loop {
        match events.recv().await {
            Ok(event) => handle_auth_event(&event, &queries, &analytics),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Auth listener lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Auth listener stopped");
}

fn handle_auth_event(event: &AuthEvent, queries: &Queries, analytics: &Analytics) {
    match event {
        AuthEvent::Restored { user_id } | AuthEvent::SignedIn { user_id } => {
            analytics.identify(user_id);
        }
        AuthEvent::TokenRefreshed { .. } => {}
        AuthEvent::SignedOut { user_id } => {
            queries.evict_user(user_id);
            analytics.reset(user_id);
            tracing::info!(user_id = %user_id, "Session torn down");
        }
        // Cached queries are left to the sweeper, which spares watched entries
        AuthEvent::Expired { user_id } => {
            analytics.reset(user_id);
            tracing::debug!(user_id = %user_id, "Idle session expired");
        }
    }
}

/// Periodically drop idle sessions and unwatched cache entries.
pub async fn run_sweeper(
    sessions: SessionStore,
    queries: Queries,
    cache_idle: Duration,
    session_idle: Duration,
) {
    let session_idle =
        chrono::Duration::from_std(session_idle).unwrap_or(chrono::Duration::MAX);
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let sessions_expired = sessions.expire_idle(Utc::now(), session_idle);
        let entries_dropped = queries.sweep(cache_idle);
        if sessions_expired > 0 || entries_dropped > 0 {
            tracing::debug!(sessions_expired, entries_dropped, "Swept idle state");
        }
    }
}
