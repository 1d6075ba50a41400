// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session loading and authentication middleware.
//!
//! Supabase access tokens are HS256 JWTs signed with the project's JWT secret.
//! The token is taken from the `milla_access_token` cookie, falling back to an
//! `Authorization: Bearer` header. A cookie session whose access token has
//! expired, or whose access cookie the browser already dropped, is refreshed
//! once with the refresh-token cookie.

use crate::error::AppError;
use crate::services::auth::AuthSession;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const ACCESS_COOKIE: &str = "milla_access_token";
pub const REFRESH_COOKIE: &str = "milla_refresh_token";

/// Audience Supabase puts on tokens of signed-in users.
const AUDIENCE: &str = "authenticated";
const REFRESH_COOKIE_DAYS: i64 = 30;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (auth user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: Option<usize>,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Authenticated user extracted from the access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    /// Forwarded to the data store so row-level security applies
    pub access_token: String,
}

/// The request's identity, present on every request after `load_session`.
#[derive(Debug, Clone, Default)]
pub struct Identity(pub Option<AuthUser>);

impl Identity {
    pub fn user(&self) -> Option<&AuthUser> {
        self.0.as_ref()
    }

    pub fn require(self) -> Result<AuthUser, AppError> {
        self.0.ok_or(AppError::Unauthorized)
    }
}

/// Verify an access token and return its claims.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);

    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

fn auth_user(claims: Claims, access_token: String) -> AuthUser {
    AuthUser {
        user_id: claims.sub,
        email: claims.email,
        access_token,
    }
}

/// Token from the session cookie, else from a bearer header.
fn request_token(jar: &CookieJar, headers: &HeaderMap) -> Option<(String, bool)> {
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some((cookie.value().to_string(), true));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| (token.trim().to_string(), false))
}

/// Middleware that resolves the request's [`Identity`] and notifies the
/// session store. Never rejects a request.
pub async fn load_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let (user, jar) = resolve_identity(&state, jar, request.headers()).await;

    if let Some(user) = &user {
        state.sessions.observe(user);
    }
    request.extensions_mut().insert(Identity(user));

    let response = next.run(request).await;
    // Cookies the handler set (login, logout) win over a refresh done here
    if sets_session_cookie(&response) {
        return response;
    }
    (jar, response).into_response()
}

fn sets_session_cookie(response: &Response) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split_once('='))
        .any(|(name, _)| matches!(name.trim(), ACCESS_COOKIE | REFRESH_COOKIE))
}

async fn resolve_identity(
    state: &AppState,
    jar: CookieJar,
    headers: &HeaderMap,
) -> (Option<AuthUser>, CookieJar) {
    let Some((token, from_cookie)) = request_token(&jar, headers) else {
        if jar.get(REFRESH_COOKIE).is_some() {
            return refresh_from_cookie(state, jar).await;
        }
        return (None, jar);
    };

    let secret = &state.config.supabase_jwt_secret;
    match verify_token(&token, secret) {
        Ok(claims) => (Some(auth_user(claims, token)), jar),
        Err(e) if from_cookie && matches!(e.kind(), ErrorKind::ExpiredSignature) => {
            refresh_from_cookie(state, jar).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected access token");
            (None, jar)
        }
    }
}

async fn refresh_from_cookie(state: &AppState, jar: CookieJar) -> (Option<AuthUser>, CookieJar) {
    let secure = state.config.cookie_secure();
    let Some(refresh_token) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) else {
        return (None, clear_session_cookies(jar, secure));
    };

    let session = match state.auth.refresh_session(&refresh_token).await {
        Ok(session) => session,
        Err(e) => {
            tracing::info!(error = %e, "Session refresh failed, signing out");
            return (None, clear_session_cookies(jar, secure));
        }
    };

    match verify_token(&session.access_token, &state.config.supabase_jwt_secret) {
        Ok(claims) => {
            let user = auth_user(claims, session.access_token.clone());
            state.sessions.refreshed(&user);
            (Some(user), set_session_cookies(jar, &session, secure))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Refreshed token failed verification");
            (None, clear_session_cookies(jar, secure))
        }
    }
}

/// Store a provider session in HttpOnly cookies.
pub fn set_session_cookies(jar: CookieJar, session: &AuthSession, secure: bool) -> CookieJar {
    let access = session_cookie(ACCESS_COOKIE, session.access_token.clone(), secure)
        .max_age(time::Duration::seconds(session.expires_in.max(0)));
    let refresh = session_cookie(REFRESH_COOKIE, session.refresh_token.clone(), secure)
        .max_age(time::Duration::days(REFRESH_COOKIE_DAYS));

    jar.add(access).add(refresh)
}

/// Expire both session cookies with the attributes they were set with.
pub fn clear_session_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    let access = session_cookie(ACCESS_COOKIE, String::new(), secure).max_age(time::Duration::ZERO);
    let refresh = session_cookie(REFRESH_COOKIE, String::new(), secure).max_age(time::Duration::ZERO);

    jar.add(access).add(refresh)
}

fn session_cookie(
    name: &'static str,
    value: String,
    secure: bool,
) -> cookie::CookieBuilder<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
}

/// Middleware that rejects requests without an identity and exposes the
/// [`AuthUser`] as an extension.
pub async fn require_auth(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<Identity>()
        .and_then(|identity| identity.user().cloned())
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
