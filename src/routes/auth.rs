// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email/password authentication routes.
//!
//! Sessions live in HttpOnly cookies; the access token is verified locally on
//! every request by `middleware::auth::load_session`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{
    clear_session_cookies, set_session_cookies, verify_token, AuthUser, Identity,
};
use crate::middleware::gate::resolve_inputs;
use crate::services::auth::{AuthSession, SignUpResponse};
use crate::services::gate::{decide, GateMode, Route};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/update-password", post(update_password))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub confirm_password: String,
}

/// Result of a sign-in or sign-up.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: Option<String>,
    /// False when the provider requires email confirmation first
    pub signed_in: bool,
    /// Route the client should navigate to
    pub next: &'static str,
}

/// Install a provider session: cookies, session store, identity.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    session: &AuthSession,
) -> Result<(CookieJar, AuthUser)> {
    let claims = verify_token(&session.access_token, &state.config.supabase_jwt_secret)
        .map_err(|e| {
            tracing::warn!(error = %e, "Provider issued a token we cannot verify");
            AppError::InvalidToken
        })?;

    let user = AuthUser {
        user_id: claims.sub,
        email: claims.email.or_else(|| session.user.email.clone()),
        access_token: session.access_token.clone(),
    };
    state.sessions.signed_in(&user);

    let jar = set_session_cookies(jar, session, state.config.cookie_secure());
    Ok((jar, user))
}

/// Where a freshly signed-in visitor goes: the public-only gate's redirect.
/// While the gate cannot decide, the landing page, which gates nothing.
async fn next_route(state: &AppState, user: &AuthUser) -> &'static str {
    let inputs = resolve_inputs(state, Some(user)).await;
    let decision = decide(GateMode::PublicOnly, &inputs);
    if decision.location().is_none() {
        tracing::debug!(user_id = %user.user_id, decision = ?decision, "Gate undecided after sign-in");
    }
    decision.location().unwrap_or(Route::Landing).path()
}

async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SignUpRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    request.validate()?;

    let email = request.email.trim().to_lowercase();
    match state.auth.sign_up(&email, &request.password).await? {
        SignUpResponse::Session(session) => {
            let (jar, user) = start_session(&state, jar, &session)?;
            tracing::info!(user_id = %user.user_id, "User signed up");

            let next = next_route(&state, &user).await;
            Ok((
                jar,
                Json(SessionResponse {
                    user_id: user.user_id,
                    email: user.email,
                    signed_in: true,
                    next,
                }),
            ))
        }
        SignUpResponse::ConfirmationRequired(user) => {
            tracing::info!(user_id = %user.id, "User signed up, awaiting email confirmation");

            Ok((
                jar,
                Json(SessionResponse {
                    user_id: user.id,
                    email: user.email,
                    signed_in: false,
                    next: Route::Login.path(),
                }),
            ))
        }
    }
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    request.validate()?;

    let email = request.email.trim().to_lowercase();
    let session = state
        .auth
        .sign_in_with_password(&email, &request.password)
        .await?;
    let (jar, user) = start_session(&state, jar, &session)?;

    let next = next_route(&state, &user).await;
    Ok((
        jar,
        Json(SessionResponse {
            user_id: user.user_id,
            email: user.email,
            signed_in: true,
            next,
        }),
    ))
}

/// Sign out locally even if the provider cannot be reached.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    if let Some(user) = identity.user() {
        if let Err(e) = state.auth.sign_out(&user.access_token).await {
            tracing::warn!(user_id = %user.user_id, error = %e, "Remote sign-out failed");
        }
        state.sessions.sign_out(&user.user_id);
        tracing::info!(user_id = %user.user_id, "User signed out");
    }

    (
        clear_session_cookies(jar, state.config.cookie_secure()),
        StatusCode::NO_CONTENT,
    )
}

/// Answers 204 for any well-formed address; provider failures are only logged.
async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode> {
    request.validate()?;

    let email = request.email.trim().to_lowercase();
    let redirect_to = state.config.password_reset_redirect();
    if let Err(e) = state
        .auth
        .reset_password_for_email(&email, &redirect_to)
        .await
    {
        tracing::warn!(error = %e, "Password reset request failed");
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn update_password(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<UpdatePasswordRequest>,
) -> Result<StatusCode> {
    let user = identity.require()?;
    request.validate()?;

    state
        .auth
        .update_password(&user.access_token, &request.password)
        .await?;
    tracing::info!(user_id = %user.user_id, "Password updated");

    Ok(StatusCode::NO_CONTENT)
}
