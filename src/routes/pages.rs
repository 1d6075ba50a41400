// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Page view documents.
//!
//! Each page route answers with a JSON document tagged by `view`. The access
//! gate runs first (see `middleware::gate::gate_pages`), so a handler only
//! executes once the visitor is allowed to see the page.

use crate::error::{AppError, Result};
use crate::middleware::auth::Identity;
use crate::models::forecast::ForecastType;
use crate::models::subscription::is_active;
use crate::models::{
    ForecastFilter, ForecastScope, PlanOffer, Profile, ReadingSection, Subscription,
    SubscriptionPlan,
};
use crate::routes::api::{forecasts_for, ForecastView};
use crate::services::account;
use crate::services::analytics::{AnalyticsEvent, EventProperties};
use crate::services::cards::{card_image, CardImage};
use crate::services::gate::Route;
use crate::services::progress::ReadingProgress;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::Uri,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(Route::Landing.path(), get(landing))
        .route(Route::Login.path(), get(login))
        .route(Route::Signup.path(), get(signup))
        .route(Route::ResetPassword.path(), get(reset_password))
        .route(Route::Onboarding.path(), get(onboarding))
        .route(Route::Paywall.path(), get(paywall))
        .route(Route::Mapa.path(), get(mapa))
        .route(Route::Previsoes.path(), get(previsoes))
        .route(Route::Perfil.path(), get(perfil))
}

/// A section's card artwork, present once its reading exists.
#[derive(Debug, Serialize)]
pub struct SectionCard {
    pub section: ReadingSection,
    pub card: CardImage,
}

#[derive(Debug, Serialize)]
pub struct ForecastTab {
    pub scope: ForecastScope,
    pub label: &'static str,
    pub active: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum PageView {
    Landing {
        signed_in: bool,
    },
    Login,
    Signup,
    ResetPassword,
    Onboarding {
        full_name: Option<String>,
        birthdate: Option<NaiveDate>,
    },
    Paywall {
        plans: Vec<PlanOffer>,
    },
    Mapa {
        full_name: Option<String>,
        active_section: ReadingSection,
        progress: ReadingProgress,
        cards: Vec<SectionCard>,
    },
    Previsoes {
        tabs: Vec<ForecastTab>,
        forecasts: Vec<ForecastView>,
    },
    Perfil {
        email: Option<String>,
        profile: Option<Profile>,
        subscription: Option<Subscription>,
        is_active: bool,
    },
}

async fn landing(Extension(identity): Extension<Identity>) -> Json<PageView> {
    Json(PageView::Landing {
        signed_in: identity.user().is_some(),
    })
}

async fn login() -> Json<PageView> {
    Json(PageView::Login)
}

async fn signup() -> Json<PageView> {
    Json(PageView::Signup)
}

async fn reset_password() -> Json<PageView> {
    Json(PageView::ResetPassword)
}

async fn onboarding(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PageView>> {
    let user = identity.require()?;
    let profile = account::profile(&state, &user).await.into_data()?;

    state.analytics.track(
        AnalyticsEvent::OnboardingStarted,
        EventProperties::for_user(&user.user_id),
    );

    let profile = profile.as_ref().as_ref();
    Ok(Json(PageView::Onboarding {
        full_name: profile.and_then(|p| p.full_name.clone()),
        birthdate: profile.and_then(|p| p.birthdate),
    }))
}

async fn paywall(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PageView>> {
    let user = identity.require()?;
    state.analytics.track(
        AnalyticsEvent::PaywallViewed,
        EventProperties::for_user(&user.user_id),
    );

    Ok(Json(PageView::Paywall {
        plans: SubscriptionPlan::ALL.iter().map(|plan| plan.offer()).collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct MapaParams {
    /// Section tab the visitor selected
    section: Option<ReadingSection>,
}

async fn mapa(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<MapaParams>,
) -> Result<Json<PageView>> {
    let user = identity.require()?;

    let (profile, progress) = tokio::join!(
        account::profile(&state, &user),
        state.progress.current(&user)
    );

    if let Some(section) = params.section {
        state.analytics.track(
            AnalyticsEvent::TabSelected,
            EventProperties {
                section: Some(section.as_str().to_string()),
                ..EventProperties::for_user(&user.user_id)
            },
        );
    }

    let cards = progress
        .sections
        .iter()
        .filter_map(|s| {
            s.reading.as_ref().map(|reading| SectionCard {
                section: s.section,
                card: card_image(&state.config.supabase_url, &reading.content.arcano),
            })
        })
        .collect();

    let full_name = profile
        .data
        .as_deref()
        .and_then(|p| p.as_ref())
        .and_then(|p| p.full_name.clone());

    Ok(Json(PageView::Mapa {
        full_name,
        active_section: params.section.unwrap_or(ReadingSection::ALL[0]),
        progress,
        cards,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct PrevisoesParams {
    #[serde(rename = "type", default)]
    scope: Option<ForecastScope>,
}

async fn previsoes(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<PrevisoesParams>,
) -> Result<Json<PageView>> {
    let user = identity.require()?;
    let active = params.scope.unwrap_or_default();

    let filter = ForecastFilter {
        scope: active,
        ..Default::default()
    };
    let forecasts = forecasts_for(&state, &user, &filter).await?;

    let tabs = [
        (ForecastScope::All, "Todas"),
        (ForecastScope::Weekly, ForecastType::Weekly.label()),
        (ForecastScope::Monthly, ForecastType::Monthly.label()),
        (ForecastScope::Yearly, ForecastType::Yearly.label()),
    ]
    .into_iter()
    .map(|(scope, label)| ForecastTab {
        scope,
        label,
        active: scope == active,
    })
    .collect();

    Ok(Json(PageView::Previsoes {
        tabs,
        forecasts: forecasts.iter().map(ForecastView::from).collect(),
    }))
}

async fn perfil(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PageView>> {
    let user = identity.require()?;

    let (profile, subscription) = tokio::join!(
        account::profile(&state, &user),
        account::subscription(&state, &user)
    );
    let profile = profile.into_data()?;
    let subscription = subscription.into_data()?;

    state.analytics.track(
        AnalyticsEvent::ProfileViewed,
        EventProperties::for_user(&user.user_id),
    );

    Ok(Json(PageView::Perfil {
        email: user.email.clone(),
        profile: profile.as_ref().clone(),
        is_active: is_active(subscription.as_ref().as_ref(), Utc::now()),
        subscription: subscription.as_ref().clone(),
    }))
}

/// Unknown page paths go back to the landing page; unknown API paths are 404.
pub async fn fallback(uri: Uri) -> Response {
    let path = uri.path();
    if path.starts_with("/api/") || path.starts_with("/auth/") {
        return AppError::NotFound(path.to_string()).into_response();
    }
    Redirect::to(Route::Landing.path()).into_response()
}
