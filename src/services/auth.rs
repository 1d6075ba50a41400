// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase Auth (GoTrue) client.
//!
//! Handles:
//! - Email/password sign-up and sign-in
//! - Access token refresh
//! - Sign-out (remote session revoke)
//! - Password reset email and password change
//!
//! Provider rejections become [`AppError::Auth`] carrying the provider's
//! message so forms can show it inline. Nothing here is retried.

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// GoTrue API client.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

/// User as returned by the auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    pub email: Option<String>,
    pub email_confirmed_at: Option<String>,
}

/// Session issued by the auth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    pub user: ProviderUser,
}

fn default_expires_in() -> i64 {
    3600
}

/// Sign-up answers with a session, or with only the user when email
/// confirmation is required first.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(AuthSession),
    ConfirmationRequired(ProviderUser),
}

/// Error body shapes used by GoTrue across versions.
#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ProviderError {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

impl AuthClient {
    pub fn new(supabase_url: &str, anon_key: &str) -> Self {
        Self::with_client(reqwest::Client::new(), supabase_url, anon_key)
    }

    pub fn with_client(http: reqwest::Client, supabase_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    /// Register a new email/password user.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AppError> {
        let response = self
            .post("/signup")
            .json(&Credentials { email, password })
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(response).await
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AppError> {
        let response = self
            .post("/token")
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password })
            .send()
            .await
            .map_err(transport_error)?;

        let session: AuthSession = check_response_json(response).await?;
        tracing::info!(user_id = %session.user.id, "User signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a new session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, AppError> {
        let response = self
            .post("/token")
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(response).await
    }

    /// Revoke the session remotely.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .post("/logout")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        check_response(response).await
    }

    /// Send a password reset email linking back to `redirect_to`.
    pub async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AppError> {
        let response = self
            .post("/recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(transport_error)?;

        check_response(response).await
    }

    /// Change the signed-in user's password.
    pub async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<ProviderUser, AppError> {
        let response = self
            .http
            .put(format!("{}/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(response).await
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Auth provider request failed: {}", e))
}

async fn provider_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ProviderError>(&body)
        .ok()
        .and_then(ProviderError::into_message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    tracing::info!(status = status.as_u16(), message = %message, "Auth provider rejected request");
    AppError::Auth(message)
}

async fn check_response(response: reqwest::Response) -> Result<(), AppError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(provider_error(response).await)
    }
}

async fn check_response_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
    if !response.status().is_success() {
        return Err(provider_error(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Auth response parse error: {}", e)))
}
