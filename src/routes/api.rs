// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes.
//!
//! Account routes only need a session. Content routes additionally pass the
//! access gate; both middlewares are applied in routes/mod.rs.

use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, Identity};
use crate::middleware::gate::decide_route;
use crate::models::subscription::is_active;
use crate::models::{
    Forecast, ForecastFilter, GenerationStatus, Profile, ProfileUpdate, Subscription,
    SubscriptionPlan,
};
use crate::services::account;
use crate::services::analytics::{Analytics, AnalyticsEvent, EventProperties};
use crate::services::cards::{card_image, CardImage};
use crate::services::gate::{GateDecision, Route};
use crate::services::progress::{ProgressHandle, ReadingProgress};
use crate::services::query_cache::{kinds, QueryKey};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Routes that need a session but not a cleared gate.
pub fn account_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/profile", patch(update_profile))
        .route("/api/onboarding", post(complete_onboarding))
        .route("/api/paywall/select", post(select_plan))
}

/// Routes behind the full access gate.
pub fn content_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/readings", get(get_readings))
        .route("/api/readings/progress", get(reading_progress_stream))
        .route("/api/readings/refresh", post(refresh_readings))
        .route("/api/forecasts", get(list_forecasts))
        .route("/api/forecasts/{id}", get(get_forecast))
}

/// Routes open to everyone.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/access", get(get_access))
        .route("/api/cards/{arcano}", get(get_card))
}

// ─── Account ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub profile: Option<Profile>,
    pub subscription: Option<Subscription>,
    pub is_onboarding_complete: bool,
    pub is_active: bool,
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let (profile, subscription) = tokio::join!(
        account::profile(&state, &user),
        account::subscription(&state, &user)
    );
    let profile = profile.into_data()?.as_ref().clone();
    let subscription = subscription.into_data()?.as_ref().clone();

    Ok(Json(MeResponse {
        is_onboarding_complete: profile
            .as_ref()
            .is_some_and(Profile::is_onboarding_complete),
        is_active: is_active(subscription.as_ref(), Utc::now()),
        user_id: user.user_id,
        email: user.email,
        profile,
        subscription,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(custom(function = "validate_birthdate"))]
    pub birthdate: Option<NaiveDate>,
    #[validate(length(min = 2, max = 10))]
    pub locale: Option<String>,
}

fn validate_birthdate(birthdate: &NaiveDate) -> std::result::Result<(), ValidationError> {
    if *birthdate > Utc::now().date_naive() {
        return Err(ValidationError::new("birthdate_in_future"));
    }
    Ok(())
}

fn must_accept(accepted: &bool) -> std::result::Result<(), ValidationError> {
    if !*accepted {
        return Err(ValidationError::new("consent_required"));
    }
    Ok(())
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>> {
    request.validate()?;

    let update = ProfileUpdate {
        full_name: request.full_name.map(|n| n.trim().to_string()),
        birthdate: request.birthdate,
        locale: request.locale,
        ..Default::default()
    };
    if update.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let profile = state
        .db
        .update_profile(&user.access_token, &user.user_id, &update)
        .await?;
    account::store_profile(&state, profile.clone());

    tracing::info!(user_id = %user.user_id, "Profile updated");
    Ok(Json(profile))
}

#[derive(Debug, Deserialize, Validate)]
pub struct OnboardingRequest {
    #[validate(length(min = 2, max = 120))]
    pub full_name: String,
    #[validate(custom(function = "validate_birthdate"))]
    pub birthdate: NaiveDate,
    #[validate(custom(function = "must_accept"))]
    pub accept_terms: bool,
    #[validate(custom(function = "must_accept"))]
    pub accept_disclaimer: bool,
}

#[derive(Serialize)]
pub struct OnboardingResponse {
    pub profile: Profile,
    /// Where the visitor goes next
    pub next: &'static str,
}

async fn complete_onboarding(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<OnboardingRequest>,
) -> Result<Json<OnboardingResponse>> {
    request.validate()?;

    let update = ProfileUpdate::complete_onboarding(
        request.full_name.trim().to_string(),
        request.birthdate,
        Utc::now(),
    );
    let profile = state
        .db
        .update_profile(&user.access_token, &user.user_id, &update)
        .await?;
    account::store_profile(&state, profile.clone());

    state.analytics.track(
        AnalyticsEvent::OnboardingCompleted,
        EventProperties {
            birthdate_year: Some(request.birthdate.year()),
            ..EventProperties::for_user(&user.user_id)
        },
    );
    tracing::info!(user_id = %user.user_id, "Onboarding completed");

    let identity = Identity(Some(user));
    let next = match decide_route(&state, &identity, Route::Onboarding).await.location() {
        Some(route) => route.path(),
        None => Route::Paywall.path(),
    };

    Ok(Json(OnboardingResponse { profile, next }))
}

#[derive(Debug, Deserialize)]
pub struct SelectPlanRequest {
    pub plan: SubscriptionPlan,
}

/// Record the visitor's plan choice. Payment itself happens outside this
/// service; the subscription row appears once the provider confirms it.
async fn select_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SelectPlanRequest>,
) -> Result<StatusCode> {
    let offer = request.plan.offer();
    state.analytics.track(
        AnalyticsEvent::SubscriptionStarted,
        EventProperties {
            plan: Some(offer.id.to_string()),
            ..EventProperties::for_user(&user.user_id)
        },
    );
    state
        .queries
        .subscriptions
        .invalidate(&account::subscription_key(&user.user_id));

    Ok(StatusCode::ACCEPTED)
}

// ─── Access ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AccessParams {
    route: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AccessResponse {
    pub route: String,
    pub decision: GateDecision,
    pub location: Option<String>,
}

/// Report the gate decision for any page route.
async fn get_access(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<AccessParams>,
) -> Result<Json<AccessResponse>> {
    let route = Route::from_path(&params.route)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown route: {}", params.route)))?;

    let decision = decide_route(&state, &identity, route).await;
    Ok(Json(AccessResponse {
        route: route.path().to_string(),
        decision,
        location: decision.location().map(|r| r.path().to_string()),
    }))
}

// ─── Readings ────────────────────────────────────────────────

async fn get_readings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<ReadingProgress> {
    Json(state.progress.current(&user).await)
}

/// Manual retry: refetch readings and jobs now.
async fn refresh_readings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<ReadingProgress> {
    Json(state.progress.refresh(&user).await)
}

/// Per-connection state of a progress stream.
struct ProgressStream {
    handle: ProgressHandle,
    analytics: Analytics,
    last: Option<ReadingProgress>,
}

impl ProgressStream {
    /// Next snapshot that differs from the last one sent, or `None` when the
    /// session's cache entries are gone.
    async fn next_snapshot(&mut self) -> Option<ReadingProgress> {
        if self.last.is_some() && !self.handle.changed().await {
            return None;
        }

        loop {
            let snapshot = self.handle.snapshot();
            if self.last.as_ref() != Some(&snapshot) {
                self.track_transition(&snapshot);
                self.last = Some(snapshot.clone());
                return Some(snapshot);
            }
            if !self.handle.changed().await {
                return None;
            }
        }
    }

    fn track_transition(&self, snapshot: &ReadingProgress) {
        let Some(previous) = self.last.as_ref().map(|p| p.status) else {
            return;
        };
        if !previous.is_in_flight() || previous == snapshot.status {
            return;
        }

        let props = EventProperties::for_user(&self.handle.user().user_id);
        match snapshot.status {
            GenerationStatus::Completed => self
                .analytics
                .track(AnalyticsEvent::ReadingGenerationCompleted, props),
            GenerationStatus::Failed => self.analytics.track(
                AnalyticsEvent::ReadingGenerationFailed,
                EventProperties {
                    error_type: Some("job_failed".to_string()),
                    ..props
                },
            ),
            _ => {}
        }
    }
}

/// Stream progress snapshots while the client stays connected. The
/// connection keeps the poller mounted.
async fn reading_progress_stream(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let progress = ProgressStream {
        handle: state.progress.mount(&user),
        analytics: state.analytics.clone(),
        last: None,
    };

    let stream = stream::unfold(progress, |mut progress| async move {
        let snapshot = progress.next_snapshot().await?;
        let event = Event::default().event("progress").json_data(&snapshot);
        Some((event, progress))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ─── Forecasts ───────────────────────────────────────────────

/// A forecast with its display labels.
#[derive(Debug, Serialize)]
pub struct ForecastView {
    #[serde(flatten)]
    pub forecast: Forecast,
    pub type_label: &'static str,
    pub period_label: String,
    pub has_audio: bool,
}

impl From<&Forecast> for ForecastView {
    fn from(forecast: &Forecast) -> Self {
        Self {
            type_label: forecast.forecast_type.label(),
            period_label: forecast.period_label(),
            has_audio: forecast.has_audio(),
            forecast: forecast.clone(),
        }
    }
}

/// Cached forecast listing for one filter.
pub async fn forecasts_for(
    state: &AppState,
    user: &AuthUser,
    filter: &ForecastFilter,
) -> Result<Arc<Vec<Forecast>>> {
    filter.validate()?;

    let key = QueryKey::with_filter(kinds::FORECASTS, &user.user_id, filter.cache_key());
    let db = state.db.clone();
    let (token, user_id, owned_filter) =
        (user.access_token.clone(), user.user_id.clone(), filter.clone());

    state
        .queries
        .forecasts
        .get(&key, state.config.cache_max_age, move || async move {
            db.list_forecasts(&token, &user_id, &owned_filter).await
        })
        .await
        .into_data()
}

async fn list_forecasts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<ForecastFilter>,
) -> Result<Json<Vec<ForecastView>>> {
    let forecasts = forecasts_for(&state, &user, &filter).await?;
    Ok(Json(forecasts.iter().map(ForecastView::from).collect()))
}

async fn get_forecast(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ForecastView>> {
    let forecast = state
        .db
        .get_forecast(&user.access_token, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Forecast {} not found", id)))?;

    Ok(Json(ForecastView::from(&forecast)))
}

// ─── Cards ───────────────────────────────────────────────────

/// Card artwork never changes for a given name.
async fn get_card(
    State(state): State<Arc<AppState>>,
    Path(arcano): Path<String>,
) -> ([(header::HeaderName, &'static str); 1], Json<CardImage>) {
    (
        [(header::CACHE_CONTROL, "public, max-age=86400")],
        Json(card_image(&state.config.supabase_url, &arcano)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onboarding_validation() {
        let valid = OnboardingRequest {
            full_name: "Ana Souza".to_string(),
            birthdate: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
            accept_terms: true,
            accept_disclaimer: true,
        };
        assert!(valid.validate().is_ok());

        let no_consent = OnboardingRequest {
            accept_disclaimer: false,
            ..valid
        };
        assert!(no_consent.validate().is_err());

        let future = OnboardingRequest {
            full_name: "Ana Souza".to_string(),
            birthdate: Utc::now().date_naive() + chrono::Duration::days(1),
            accept_terms: true,
            accept_disclaimer: true,
        };
        assert!(future.validate().is_err());
    }

    #[test]
    fn test_profile_update_validation() {
        let request = UpdateProfileRequest {
            full_name: Some(String::new()),
            birthdate: None,
            locale: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_forecast_view_labels() {
        let forecast: Forecast = serde_json::from_value(serde_json::json!({
            "id": "f1",
            "user_id": "u1",
            "type": "monthly",
            "period_start": "2026-02-01",
            "period_end": "2026-02-28",
            "title": "Fevereiro",
            "content": "...",
            "summary": null,
            "audio_url": "https://cdn/audio.mp3",
            "audio_duration_seconds": 180,
            "prompt_version": "v1",
            "model_used": "m",
            "delivered_at": "2026-02-01T08:00:00Z",
            "created_at": "2026-01-31T08:00:00Z",
            "expires_at": null
        }))
        .unwrap();

        let view = serde_json::to_value(ForecastView::from(&forecast)).unwrap();
        assert_eq!(view["type_label"], "Mensal");
        assert_eq!(view["period_label"], "fevereiro de 2026");
        assert_eq!(view["has_audio"], true);
        assert_eq!(view["type"], "monthly");
    }
}
