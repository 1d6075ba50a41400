// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie tests.
//!
//! These tests verify the cookies set on sign-in, the silent refresh of an
//! expired access token, and that logout removes cookies with the same
//! attributes they were created with.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tower::ServiceExt;

mod common;

use common::{body_json, get, json_request, location, seed_member, session_cookie};
use milla_gateway::services::query_cache::QueryKey;

fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

fn cookie_value(set_cookie: &str) -> &str {
    let pair = set_cookie.split(';').next().unwrap();
    pair.split_once('=').unwrap().1
}

fn logout_request(cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_logout_cookie_removal_localhost_attributes() {
    let (app, _, _) = common::create_test_app_with_frontend_url("http://localhost:5173").await;

    let cookie = format!("{}; milla_refresh_token=refresh-user-1", session_cookie("user-1"));
    let response = app.oneshot(logout_request(&cookie)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookies = set_cookie_headers(&response);
    for name in ["milla_access_token", "milla_refresh_token"] {
        let cookie = find_cookie(&set_cookies, name);
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
        assert!(!cookie.contains("Domain="));
    }
}

#[tokio::test]
async fn test_logout_cookie_removal_production_domain_attributes() {
    let (app, _, fake) = common::create_test_app_with_frontend_url("https://app.milla.com.br").await;

    let response = app
        .oneshot(logout_request(&session_cookie("user-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(fake.logouts.load(Ordering::SeqCst), 1);

    let set_cookies = set_cookie_headers(&response);
    for name in ["milla_access_token", "milla_refresh_token"] {
        let cookie = find_cookie(&set_cookies, name);
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Secure"));
        assert!(!cookie.contains("Domain="));
    }
}

#[tokio::test]
async fn test_anonymous_logout_still_clears_cookies() {
    let (app, _, fake) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(fake.logouts.load(Ordering::SeqCst), 0);
    assert_eq!(set_cookie_headers(&response).len(), 2);
}

#[tokio::test]
async fn test_login_sets_session_cookies_and_next_route() {
    let (app, state, fake) = common::create_test_app().await;
    fake.add_user("ana@example.com", "segredo", "user-1");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "Ana@Example.com", "password": "segredo" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookies = set_cookie_headers(&response);
    let access = find_cookie(&set_cookies, "milla_access_token");
    let refresh = find_cookie(&set_cookies, "milla_refresh_token");
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("Max-Age=3600"));
    assert!(refresh.contains("Max-Age=2592000"));
    assert_eq!(cookie_value(&refresh), "refresh-user-1");

    let body = body_json(response).await;
    assert_eq!(body["user_id"], "user-1");
    assert_eq!(body["signed_in"], true);
    assert_eq!(body["next"], "/onboarding");
    assert!(state.sessions.is_signed_in("user-1"));

    // The issued cookie works for the next request
    let cookie = format!("milla_access_token={}", cookie_value(&access));
    let response = app.oneshot(get("/onboarding", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejection_is_shown_inline() {
    let (app, _, fake) = common::create_test_app().await;
    fake.add_user("ana@example.com", "segredo", "user-1");

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "ana@example.com", "password": "errada" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie_headers(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body["error"], "auth_error");
    assert_eq!(body["details"], "Invalid login credentials");
}

#[tokio::test]
async fn test_signup_validation_and_duplicate() {
    let (app, _, fake) = common::create_test_app().await;
    fake.add_user("ana@example.com", "segredo", "user-1");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            json!({ "email": "bia@example.com", "password": "segredo", "confirm_password": "outro" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            json!({ "email": "ana@example.com", "password": "segredo", "confirm_password": "segredo" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["details"], "User already registered");

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            json!({ "email": "bia@example.com", "password": "segredo", "confirm_password": "segredo" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie_headers(&response).len(), 2);
    assert_eq!(body_json(response).await["next"], "/onboarding");
}

#[tokio::test]
async fn test_expired_token_is_refreshed_from_cookie() {
    let (app, state, fake) = common::create_test_app().await;
    seed_member(&fake, "user-1");

    let cookie = format!(
        "milla_access_token={}; milla_refresh_token=refresh-user-1",
        common::create_test_jwt("user-1", -3600)
    );
    let response = app.oneshot(get("/mapa", Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookies = set_cookie_headers(&response);
    let access = find_cookie(&set_cookies, "milla_access_token");
    assert!(access.contains("Max-Age=3600"));
    assert!(state.sessions.is_signed_in("user-1"));
}

#[tokio::test]
async fn test_refresh_cookie_alone_restores_session() {
    let (app, state, fake) = common::create_test_app().await;
    seed_member(&fake, "user-1");

    // The browser has already dropped the access cookie at its Max-Age
    let response = app
        .clone()
        .oneshot(get("/mapa", Some("milla_refresh_token=refresh-user-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookies = set_cookie_headers(&response);
    let access = find_cookie(&set_cookies, "milla_access_token");
    assert!(access.contains("Max-Age=3600"));
    assert!(state.sessions.is_signed_in("user-1"));

    let cookie = format!("milla_access_token={}", cookie_value(&access));
    let response = app.oneshot(get("/perfil", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_with_refreshed_session_clears_cookies() {
    let (app, state, fake) = common::create_test_app().await;
    seed_member(&fake, "user-1");

    let cookie = format!(
        "milla_access_token={}; milla_refresh_token=refresh-user-1",
        common::create_test_jwt("user-1", -3600)
    );
    let response = app.oneshot(logout_request(&cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookies = set_cookie_headers(&response);
    assert_eq!(set_cookies.len(), 2, "{set_cookies:?}");
    for name in ["milla_access_token", "milla_refresh_token"] {
        let cookie = find_cookie(&set_cookies, name);
        assert!(cookie.contains("Max-Age=0"), "{cookie}");
        assert_eq!(cookie_value(&cookie), "");
    }
    assert_eq!(fake.logouts.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!state.sessions.is_signed_in("user-1"));
}

#[tokio::test]
async fn test_logout_with_only_refresh_cookie_clears_cookies() {
    let (app, _, fake) = common::create_test_app().await;
    seed_member(&fake, "user-1");

    let response = app
        .oneshot(logout_request("milla_refresh_token=refresh-user-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookies = set_cookie_headers(&response);
    assert_eq!(set_cookies.len(), 2, "{set_cookies:?}");
    assert!(find_cookie(&set_cookies, "milla_access_token").contains("Max-Age=0"));
    assert!(find_cookie(&set_cookies, "milla_refresh_token").contains("Max-Age=0"));
    assert_eq!(fake.logouts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_login_after_failed_refresh_keeps_new_cookies() {
    let (app, _, fake) = common::create_test_app().await;
    fake.add_user("ana@example.com", "segredo", "user-1");

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/login",
            Some("milla_refresh_token=garbage"),
            json!({ "email": "ana@example.com", "password": "segredo" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookies = set_cookie_headers(&response);
    assert_eq!(set_cookies.len(), 2, "{set_cookies:?}");
    let access = find_cookie(&set_cookies, "milla_access_token");
    let refresh = find_cookie(&set_cookies, "milla_refresh_token");
    assert!(access.contains("Max-Age=3600"));
    assert!(!cookie_value(&access).is_empty());
    assert_eq!(cookie_value(&refresh), "refresh-user-1");
}

#[tokio::test]
async fn test_login_while_store_unavailable_goes_to_landing() {
    let (app, _, fake) = common::create_test_app().await;
    fake.add_user("ana@example.com", "segredo", "user-1");
    fake.fail("profiles");

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "ana@example.com", "password": "segredo" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["next"], "/");
}

#[tokio::test]
async fn test_expired_token_with_bad_refresh_signs_out() {
    let (app, _, _) = common::create_test_app().await;

    let cookie = format!(
        "milla_access_token={}; milla_refresh_token=garbage",
        common::create_test_jwt("user-1", -3600)
    );
    let response = app.oneshot(get("/mapa", Some(&cookie))).await.unwrap();

    assert_eq!(location(&response), "/login");
    let set_cookies = set_cookie_headers(&response);
    assert!(find_cookie(&set_cookies, "milla_access_token").contains("Max-Age=0"));
    assert!(find_cookie(&set_cookies, "milla_refresh_token").contains("Max-Age=0"));
}

#[tokio::test]
async fn test_bearer_header_is_accepted() {
    let (app, _, fake) = common::create_test_app().await;
    seed_member(&fake, "user-1");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", common::create_test_jwt("user-1", 3600)),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "user-1@example.com");
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn test_logout_evicts_cached_queries() {
    let (app, state, fake) = common::create_test_app().await;
    seed_member(&fake, "user-1");
    let cookie = session_cookie("user-1");

    let response = app.clone().oneshot(get("/api/me", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let key = QueryKey::new("profile", "user-1");
    assert!(state.queries.profiles.peek(&key).is_some());

    let response = app.oneshot(logout_request(&cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Teardown runs on the auth listener task
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(state.queries.profiles.peek(&key).is_none());
    assert!(!state.sessions.is_signed_in("user-1"));
    assert!(!state.analytics.is_identified("user-1"));
}

#[tokio::test]
async fn test_password_reset_always_accepted() {
    let (app, _, fake) = common::create_test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/reset-password",
            None,
            json!({ "email": "ninguem@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(fake.recoveries.load(Ordering::SeqCst), 1);

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/reset-password",
            None,
            json!({ "email": "not-an-email" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_password_requires_session() {
    let (app, _, _) = common::create_test_app().await;
    let body = json!({ "password": "novasenha", "confirm_password": "novasenha" });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/auth/update-password", None, body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/update-password",
            Some(&session_cookie("user-1")),
            body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
