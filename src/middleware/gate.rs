// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access gate middleware for pages and API routes.

use crate::error::AppError;
use crate::middleware::auth::{AuthUser, Identity};
use crate::models::subscription::is_active;
use crate::models::{Profile, Subscription};
use crate::services::account;
use crate::services::gate::{decide, Fact, GateDecision, GateInputs, GateMode, Route};
use crate::services::query_cache::{QueryCache, QueryKey, QueryState};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

fn is_onboarded(profile: &Option<Profile>) -> bool {
    profile.as_ref().is_some_and(Profile::is_onboarding_complete)
}

fn is_subscribed(subscription: &Option<Subscription>) -> bool {
    is_active(subscription.as_ref(), Utc::now())
}

/// Wait up to `wait` for a cached query to settle.
///
/// On timeout the fetch keeps running and lands in the cache; the fact is
/// taken from whatever is cached now, or `Loading` if nothing is.
async fn bounded<T, F>(
    wait: Duration,
    query: F,
    cache: &QueryCache<T>,
    key: &QueryKey,
    predicate: fn(&T) -> bool,
) -> Fact
where
    T: Send + Sync + 'static,
    F: Future<Output = QueryState<T>>,
{
    match tokio::time::timeout(wait, query).await {
        Ok(state) => Fact::from_query(&state, predicate),
        Err(_) => {
            tracing::debug!(kind = key.kind, user_id = %key.user_id, "Gate input still loading");
            match cache.peek(key).and_then(|state| state.data) {
                Some(data) => Fact::Known(predicate(&data)),
                None => Fact::Loading,
            }
        }
    }
}

/// Resolve the three gate facts for a visitor.
pub async fn resolve_inputs(state: &AppState, user: Option<&AuthUser>) -> GateInputs {
    let Some(user) = user else {
        return GateInputs::ANONYMOUS;
    };

    let wait = state.config.gate_wait;
    let profile_key = account::profile_key(&user.user_id);
    let subscription_key = account::subscription_key(&user.user_id);

    let (onboarded, subscribed) = tokio::join!(
        bounded(
            wait,
            account::profile(state, user),
            &state.queries.profiles,
            &profile_key,
            is_onboarded,
        ),
        bounded(
            wait,
            account::subscription(state, user),
            &state.queries.subscriptions,
            &subscription_key,
            is_subscribed,
        ),
    );

    GateInputs {
        identity: Fact::Known(true),
        onboarded,
        subscribed,
    }
}

/// Decide for a route, given the request's identity.
pub async fn decide_route(state: &AppState, identity: &Identity, route: Route) -> GateDecision {
    match route.gate_mode() {
        Some(mode) => decide(mode, &resolve_inputs(state, identity.user()).await),
        None => GateDecision::Render,
    }
}

fn loading_view() -> Response {
    (
        StatusCode::ACCEPTED,
        [(header::RETRY_AFTER, "1")],
        Json(json!({ "view": "loading" })),
    )
        .into_response()
}

fn unavailable_view() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, "5")],
        Json(json!({ "view": "error", "retry": true })),
    )
        .into_response()
}

/// Response for a page request that must not render.
pub fn page_response(decision: GateDecision) -> Option<Response> {
    match decision {
        GateDecision::Render => None,
        GateDecision::Loading => Some(loading_view()),
        GateDecision::Unavailable => Some(unavailable_view()),
        redirect => redirect
            .location()
            .map(|route| Redirect::to(route.path()).into_response()),
    }
}

/// Response for an API request that must not proceed.
pub fn api_response(decision: GateDecision) -> Option<Response> {
    match decision {
        GateDecision::Render => None,
        GateDecision::Loading => Some(loading_view()),
        GateDecision::Unavailable => Some(unavailable_view()),
        GateDecision::RedirectToLogin => Some(AppError::Unauthorized.into_response()),
        redirect => redirect.location().map(|route| {
            (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "forbidden", "redirect": route.path() })),
            )
                .into_response()
        }),
    }
}

/// Gate page routes by their path.
pub async fn gate_pages(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    request: Request,
    next: Next,
) -> Response {
    let Some(route) = Route::from_path(request.uri().path()) else {
        return next.run(request).await;
    };

    let decision = decide_route(&state, &identity, route).await;
    if decision != GateDecision::Render {
        tracing::debug!(route = route.path(), decision = ?decision, "Page gated");
    }

    match page_response(decision) {
        Some(response) => response,
        None => next.run(request).await,
    }
}

/// Gate content API routes: every stage must be cleared.
pub async fn gate_api(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    request: Request,
    next: Next,
) -> Response {
    let inputs = resolve_inputs(&state, identity.user()).await;

    match api_response(decide(GateMode::Protected, &inputs)) {
        Some(response) => response,
        None => next.run(request).await,
    }
}
