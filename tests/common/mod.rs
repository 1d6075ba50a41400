// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test harness: an in-process fake of the Supabase REST and auth
//! endpoints, plus an app wired against it.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, post, put},
    Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use milla_gateway::config::Config;
use milla_gateway::routes::create_router;
use milla_gateway::services::run_auth_listener;
use milla_gateway::AppState;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[allow(dead_code)]
pub const TEST_JWT_SECRET: &[u8] = b"test_jwt_secret_32_bytes_minimum!";

/// Create a Supabase-style access token for `user_id`, expiring
/// `exp_offset_secs` from now (negative for an expired token).
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, exp_offset_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = json!({
        "sub": user_id,
        "exp": now + exp_offset_secs,
        "iat": now,
        "aud": "authenticated",
        "email": format!("{user_id}@example.com"),
        "role": "authenticated",
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET),
    )
    .unwrap()
}

/// Cookie header carrying a valid session for `user_id`.
#[allow(dead_code)]
pub fn session_cookie(user_id: &str) -> String {
    format!("milla_access_token={}", create_test_jwt(user_id, 3600))
}

/// State of the fake Supabase project.
#[derive(Default)]
pub struct FakeSupabase {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    /// email -> (password, user id)
    users: Mutex<HashMap<String, (String, String)>>,
    requests: Mutex<HashMap<String, usize>>,
    pub logouts: AtomicUsize,
    pub recoveries: AtomicUsize,
}

#[allow(dead_code)]
impl FakeSupabase {
    pub fn insert(&self, table: &str, row: Value) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite `field` on the row of `table` whose id is `id`.
    pub fn set_field(&self, table: &str, id: &str, field: &str, value: Value) {
        let mut tables = self.tables.lock().unwrap();
        for row in tables.entry(table.to_string()).or_default() {
            if row["id"] == id {
                row[field] = value.clone();
            }
        }
    }

    /// Make every request to `table` answer 500.
    pub fn fail(&self, table: &str) {
        self.failing.lock().unwrap().insert(table.to_string());
    }

    pub fn recover(&self, table: &str) {
        self.failing.lock().unwrap().remove(table);
    }

    /// Hold every response for `table` by `delay`.
    pub fn delay(&self, table: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(table.to_string(), delay);
    }

    pub fn add_user(&self, email: &str, password: &str, user_id: &str) {
        self.users
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user_id.to_string()));
    }

    /// Number of REST requests seen for `table`.
    pub fn request_count(&self, table: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(table)
            .copied()
            .unwrap_or(0)
    }
}

fn postgrest_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

/// Apply PostgREST-style horizontal filters that the gateway uses.
fn matches(row: &Value, params: &[(String, String)]) -> bool {
    params.iter().all(|(column, filter)| {
        if matches!(column.as_str(), "select" | "order") {
            return true;
        }
        let cell = &row[column.as_str()];
        let text = match cell {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if let Some(value) = filter.strip_prefix("eq.") {
            text == value
        } else if let Some(value) = filter.strip_prefix("gte.") {
            !cell.is_null() && text.as_str() >= value
        } else if let Some(value) = filter.strip_prefix("lte.") {
            !cell.is_null() && text.as_str() <= value
        } else if filter == "not.is.null" {
            !cell.is_null()
        } else {
            true
        }
    })
}

async fn rest(
    State(fake): State<Arc<FakeSupabase>>,
    Path(table): Path<String>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
    body: Body,
) -> Response {
    *fake
        .requests
        .lock()
        .unwrap()
        .entry(table.clone())
        .or_default() += 1;

    let delay = fake.delays.lock().unwrap().get(&table).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if fake.failing.lock().unwrap().contains(&table) {
        return postgrest_error(StatusCode::INTERNAL_SERVER_ERROR, "XX000", "database unavailable");
    }

    let single = headers
        .get(header::ACCEPT)
        .is_some_and(|v| v.as_bytes() == b"application/vnd.pgrst.object+json");

    let patch: Value = if method == Method::PATCH {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    } else {
        Value::Null
    };

    let mut tables = fake.tables.lock().unwrap();
    let rows = tables.entry(table).or_default();

    if method == Method::PATCH {
        for row in rows.iter_mut().filter(|row| matches(row, &params)) {
            if let (Some(row), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
                for (k, v) in patch {
                    row.insert(k.clone(), v.clone());
                }
            }
        }
    }

    let mut selected: Vec<Value> = rows
        .iter()
        .filter(|row| matches(row, &params))
        .cloned()
        .collect();

    if let Some((_, order)) = params.iter().find(|(k, _)| k == "order") {
        if let Some(column) = order.strip_suffix(".desc") {
            selected.sort_by(|a, b| b[column].to_string().cmp(&a[column].to_string()));
        }
    }

    if single {
        if selected.len() != 1 {
            return postgrest_error(
                StatusCode::NOT_ACCEPTABLE,
                "PGRST116",
                "JSON object requested, multiple (or no) rows returned",
            );
        }
        return Json(selected.remove(0)).into_response();
    }
    Json(Value::Array(selected)).into_response()
}

fn session_body(user_id: &str, email: &str) -> Value {
    json!({
        "access_token": create_test_jwt(user_id, 3600),
        "refresh_token": format!("refresh-{user_id}"),
        "token_type": "bearer",
        "expires_in": 3600,
        "user": { "id": user_id, "email": email, "email_confirmed_at": "2026-01-01T00:00:00Z" }
    })
}

#[derive(serde::Deserialize)]
struct TokenParams {
    grant_type: String,
}

async fn token(
    State(fake): State<Arc<FakeSupabase>>,
    Query(params): Query<TokenParams>,
    Json(body): Json<Value>,
) -> Response {
    match params.grant_type.as_str() {
        "password" => {
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            let users = fake.users.lock().unwrap();
            match users.get(email) {
                Some((expected, user_id)) if expected == password => {
                    Json(session_body(user_id, email)).into_response()
                }
                _ => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_grant",
                        "error_description": "Invalid login credentials"
                    })),
                )
                    .into_response(),
            }
        }
        "refresh_token" => {
            let refresh = body["refresh_token"].as_str().unwrap_or_default();
            match refresh.strip_prefix("refresh-") {
                Some(user_id) => {
                    Json(session_body(user_id, &format!("{user_id}@example.com"))).into_response()
                }
                None => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant", "error_description": "Invalid Refresh Token" })),
                )
                    .into_response(),
            }
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn signup(State(fake): State<Arc<FakeSupabase>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();

    let mut users = fake.users.lock().unwrap();
    if users.contains_key(&email) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "code": 422, "msg": "User already registered" })),
        )
            .into_response();
    }
    let user_id = format!("user-{}", users.len() + 1);
    users.insert(email.clone(), (password, user_id.clone()));
    Json(session_body(&user_id, &email)).into_response()
}

async fn logout(State(fake): State<Arc<FakeSupabase>>) -> StatusCode {
    fake.logouts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn recover(State(fake): State<Arc<FakeSupabase>>) -> Json<Value> {
    fake.recoveries.fetch_add(1, Ordering::SeqCst);
    Json(json!({}))
}

async fn update_user(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "missing token" }))).into_response();
    }
    Json(json!({ "id": "user-1", "email": "user-1@example.com" })).into_response()
}

/// Start the fake project on an ephemeral port; returns its base URL.
pub async fn spawn_fake_supabase() -> (String, Arc<FakeSupabase>) {
    let fake = Arc::new(FakeSupabase::default());

    let app = Router::new()
        .route("/rest/v1/{table}", any(rest))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/recover", post(recover))
        .route("/auth/v1/user", put(update_user))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), fake)
}

/// Test configuration pointing at `supabase_url`, with short timings.
#[allow(dead_code)]
pub fn test_config(supabase_url: &str) -> Config {
    Config {
        supabase_url: supabase_url.to_string(),
        supabase_jwt_secret: TEST_JWT_SECRET.to_vec(),
        readings_poll_interval: Duration::from_millis(50),
        jobs_poll_interval: Duration::from_millis(30),
        gate_wait: Duration::from_millis(300),
        ..Config::default()
    }
}

/// Create a test app backed by a fresh fake Supabase.
/// Returns the router, the shared state and the fake.
#[allow(dead_code)]
pub async fn create_test_app() -> (Router, Arc<AppState>, Arc<FakeSupabase>) {
    create_test_app_with(|_| {}).await
}

#[allow(dead_code)]
pub async fn create_test_app_with_frontend_url(
    frontend_url: &str,
) -> (Router, Arc<AppState>, Arc<FakeSupabase>) {
    let frontend_url = frontend_url.to_string();
    create_test_app_with(move |config| config.frontend_url = frontend_url).await
}

#[allow(dead_code)]
pub async fn create_test_app_with(
    customize: impl FnOnce(&mut Config),
) -> (Router, Arc<AppState>, Arc<FakeSupabase>) {
    let (url, fake) = spawn_fake_supabase().await;
    let mut config = test_config(&url);
    customize(&mut config);

    let state = Arc::new(AppState::new(config));
    tokio::spawn(run_auth_listener(
        state.sessions.subscribe(),
        state.queries.clone(),
        state.analytics.clone(),
    ));

    (create_router(state.clone()), state, fake)
}

// ─── Row fixtures ────────────────────────────────────────────

#[allow(dead_code)]
pub fn profile_row(user_id: &str, onboarded: bool) -> Value {
    let completed = onboarded.then_some("2026-01-02T10:00:00Z");
    json!({
        "id": user_id,
        "full_name": onboarded.then_some("Ana Souza"),
        "birthdate": onboarded.then_some("1990-05-17"),
        "locale": "pt-BR",
        "onboarding_completed_at": completed,
        "consent_terms_at": completed,
        "consent_disclaimer_at": completed,
        "created_at": "2026-01-01T10:00:00Z",
        "updated_at": "2026-01-01T10:00:00Z"
    })
}

#[allow(dead_code)]
pub fn subscription_row(user_id: &str, status: &str, days_left: i64) -> Value {
    let end = chrono::Utc::now() + chrono::Duration::days(days_left);
    json!({
        "id": format!("sub-{user_id}"),
        "user_id": user_id,
        "status": status,
        "plan": "yearly",
        "payment_provider": "stripe",
        "provider_subscription_id": "sub_123",
        "current_period_start": "2026-01-01T00:00:00Z",
        "current_period_end": end.to_rfc3339(),
        "canceled_at": null,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z"
    })
}

#[allow(dead_code)]
pub fn job_row(user_id: &str, id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "type": "generate_reading",
        "status": status,
        "payload": {},
        "result": null,
        "idempotency_key": format!("key-{id}"),
        "attempts": 1,
        "max_attempts": 3,
        "last_error": null,
        "scheduled_at": null,
        "started_at": null,
        "completed_at": null,
        "created_at": "2026-01-03T10:00:00Z"
    })
}

#[allow(dead_code)]
pub fn reading_row(user_id: &str, section: &str, arcano: &str) -> Value {
    json!({
        "id": format!("{user_id}-{section}"),
        "user_id": user_id,
        "section": section,
        "content": {
            "arcano": arcano,
            "titulo": "Título",
            "interpretacao": "Interpretação",
            "sombra": "Sombra",
            "conselho": "Conselho"
        },
        "prompt_version": "v1",
        "model_used": "gpt-4o",
        "created_at": "2026-01-03T10:05:00Z"
    })
}

#[allow(dead_code)]
pub fn forecast_row(user_id: &str, id: &str, kind: &str, start: &str, end: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "type": kind,
        "period_start": start,
        "period_end": end,
        "title": "Previsão",
        "content": "Conteúdo",
        "summary": null,
        "audio_url": null,
        "audio_duration_seconds": null,
        "prompt_version": "v1",
        "model_used": "gpt-4o",
        "calculation_base": {},
        "delivered_at": format!("{start}T08:00:00Z"),
        "created_at": format!("{start}T07:00:00Z"),
        "expires_at": null
    })
}

/// Seed a user who has cleared every gate stage.
#[allow(dead_code)]
pub fn seed_member(fake: &FakeSupabase, user_id: &str) {
    fake.insert("profiles", profile_row(user_id, true));
    fake.insert("subscriptions", subscription_row(user_id, "active", 30));
}

// ─── Response helpers ────────────────────────────────────────

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

#[allow(dead_code)]
pub fn get(uri: &str, cookie: Option<&str>) -> axum::http::Request<Body> {
    let mut builder = axum::http::Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn json_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Value,
) -> axum::http::Request<Body> {
    let mut builder = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
