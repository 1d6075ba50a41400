// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod account;
pub mod analytics;
pub mod auth;
pub mod cards;
pub mod gate;
pub mod progress;
pub mod query_cache;
pub mod session;

pub use analytics::{Analytics, AnalyticsEvent, EventProperties};
pub use auth::{AuthClient, AuthSession};
pub use gate::{decide, GateDecision, GateInputs, GateMode, Route};
pub use progress::{ProgressHandle, ProgressTracker, ReadingProgress};
pub use query_cache::{Queries, QueryCache, QueryKey, QueryState};
pub use session::{run_auth_listener, run_sweeper, AuthEvent, SessionStore};
