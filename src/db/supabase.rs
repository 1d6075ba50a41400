// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase PostgREST client with typed row operations.
//!
//! Every call is made with the signed-in user's access token so the store's
//! row-level security applies. Provides:
//! - Profiles (read, partial update)
//! - Subscriptions (zero-or-one row per user)
//! - Readings and jobs (generation progress)
//! - Forecasts (filtered listing, single lookup)

use crate::db::tables;
use crate::error::AppError;
use crate::models::{Forecast, ForecastFilter, Job, Profile, ProfileUpdate, Reading, Subscription};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Accept header asking PostgREST for exactly one row as a JSON object.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST database client.
#[derive(Clone)]
pub struct SupabaseDb {
    http: reqwest::Client,
    rest_url: String,
    anon_key: String,
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

impl SupabaseDb {
    /// Create a client for the project at `supabase_url`.
    pub fn new(supabase_url: &str, anon_key: &str) -> Self {
        Self::with_client(reqwest::Client::new(), supabase_url, anon_key)
    }

    /// Create a client sharing an existing HTTP connection pool.
    pub fn with_client(http: reqwest::Client, supabase_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    fn request(&self, method: Method, table: &str, access_token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }

    // ─── Profiles ────────────────────────────────────────────────

    /// Get the profile row for a user, if it exists.
    pub async fn get_profile(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Option<Profile>, AppError> {
        let request = self
            .request(Method::GET, tables::PROFILES, access_token)
            .query(&[("select", "*".to_string()), ("id", eq(user_id))]);

        self.fetch_optional(request).await
    }

    /// Apply a partial update and return the updated row.
    pub async fn update_profile(
        &self,
        access_token: &str,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, AppError> {
        let request = self
            .request(Method::PATCH, tables::PROFILES, access_token)
            .query(&[("id", eq(user_id)), ("select", "*".to_string())])
            .header("Prefer", "return=representation")
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .json(update);

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;

        match Self::check_response_json(response).await {
            Err(e) if e.is_no_rows() => {
                Err(AppError::NotFound(format!("Profile {} not found", user_id)))
            }
            other => other,
        }
    }

    // ─── Subscriptions ───────────────────────────────────────────

    /// Get the user's subscription. No row is a normal state, not an error.
    pub async fn get_subscription(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let request = self
            .request(Method::GET, tables::SUBSCRIPTIONS, access_token)
            .query(&[("select", "*".to_string()), ("user_id", eq(user_id))]);

        self.fetch_optional(request).await
    }

    // ─── Generation Progress ─────────────────────────────────────

    /// List every produced reading for a user.
    pub async fn list_readings(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Vec<Reading>, AppError> {
        let request = self
            .request(Method::GET, tables::READINGS, access_token)
            .query(&[("select", "*".to_string()), ("user_id", eq(user_id))]);

        self.fetch_all(request).await
    }

    /// List a user's generation jobs, newest first.
    pub async fn list_jobs(&self, access_token: &str, user_id: &str) -> Result<Vec<Job>, AppError> {
        let request = self.request(Method::GET, tables::JOBS, access_token).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "created_at.desc".to_string()),
        ]);

        self.fetch_all(request).await
    }

    // ─── Forecasts ───────────────────────────────────────────────

    /// List delivered forecasts matching `filter`, most recently delivered first.
    pub async fn list_forecasts(
        &self,
        access_token: &str,
        user_id: &str,
        filter: &ForecastFilter,
    ) -> Result<Vec<Forecast>, AppError> {
        let request = self
            .request(Method::GET, tables::FORECASTS, access_token)
            .query(&forecast_query(user_id, filter));

        self.fetch_all(request).await
    }

    /// Get a single forecast by id.
    pub async fn get_forecast(
        &self,
        access_token: &str,
        forecast_id: &str,
    ) -> Result<Option<Forecast>, AppError> {
        let request = self
            .request(Method::GET, tables::FORECASTS, access_token)
            .query(&[("select", "*".to_string()), ("id", eq(forecast_id))]);

        self.fetch_optional(request).await
    }

    // ─── Response Handling ───────────────────────────────────────

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;

        Self::check_response_json(response).await
    }

    /// Single-row read where zero rows maps to `None`.
    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, AppError> {
        let response = request
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .send()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;

        match Self::check_response_json(response).await {
            Ok(row) => Ok(Some(row)),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check response status and parse the JSON body.
    ///
    /// Errors carry the PostgREST code first so callers can match on it.
    async fn check_response_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if let Ok(PostgrestError {
                code: Some(code),
                message,
            }) = serde_json::from_str::<PostgrestError>(&body)
            {
                return Err(AppError::Store(format!(
                    "{}: {}",
                    code,
                    message.unwrap_or_default()
                )));
            }

            return Err(AppError::Store(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Store(format!("JSON parse error: {}", e)))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// Query parameters for the forecast listing.
fn forecast_query(user_id: &str, filter: &ForecastFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("user_id", eq(user_id)),
        ("delivered_at", "not.is.null".to_string()),
        ("order", "delivered_at.desc".to_string()),
    ];

    if let Some(forecast_type) = filter.scope.forecast_type() {
        query.push(("type", eq(forecast_type.as_str())));
    }
    if let Some(start) = filter.start_date {
        query.push(("period_start", format!("gte.{}", start)));
    }
    if let Some(end) = filter.end_date {
        query.push(("period_end", format!("lte.{}", end)));
    }

    query
}
