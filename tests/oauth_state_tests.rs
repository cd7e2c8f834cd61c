// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth connect flow tests: state verification, CSRF binding, and a full
//! callback against a mocked provider.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::Utc;
use devboard_integrations::db::ConnectionStore;
use devboard_integrations::models::Connection;
use devboard_integrations::providers::ProviderId;
use devboard_integrations::routes::connect::{sign_state, CSRF_COOKIE};
use tower::ServiceExt;

mod common;

const CSRF: &str = "0123456789abcdef";

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect has a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

fn callback_request(query: &str, csrf_cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(format!("/connect/github/callback?{}", query));
    if let Some(csrf) = csrf_cookie {
        builder = builder.header(header::COOKIE, format!("{}={}", CSRF_COOKIE, csrf));
    }
    builder.body(Body::empty()).unwrap()
}

fn fresh_state(app: &common::TestApp, user_id: &str) -> String {
    sign_state(
        user_id,
        CSRF,
        Utc::now().timestamp_millis(),
        &app.state.config.oauth_state_key,
    )
    .unwrap()
}

// ─── Connect start ───────────────────────────────────────────

#[tokio::test]
async fn test_connect_start_redirects_with_state_and_cookie() {
    let app = common::create_test_app_with(common::registry_with(&[(
        "INTEGRATION_GITHUB_CLIENT_ID",
        "gh-client",
    )]));
    let token = common::session_token(&app.state, "user-1");

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connect/github")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let url = location(&response);
    assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
    assert!(url.contains("client_id=gh-client"));
    assert!(url.contains("state="));
    assert!(url.contains(
        "redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fconnect%2Fgithub%2Fcallback"
    ));

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("csrf cookie set")
        .to_str()
        .unwrap();
    assert!(cookie.starts_with(&format!("{}=", CSRF_COOKIE)));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/connect"));
}

#[tokio::test]
async fn test_connect_start_requires_session() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connect/github")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_connect_start_rejects_manual_and_unknown_providers() {
    let app = common::create_test_app();
    let token = common::session_token(&app.state, "user-1");

    let manual = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/connect/hackernews")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(manual.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connect/myspace")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

// ─── Callback ────────────────────────────────────────────────

#[tokio::test]
async fn test_callback_invalid_state_rejected() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(callback_request("code=abc&state=not-a-state", Some(CSRF)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.list_connections_for_user("user-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_callback_expired_state_rejected() {
    let app = common::create_test_app();
    let stale = sign_state(
        "user-1",
        CSRF,
        Utc::now().timestamp_millis() - 16 * 60 * 1000,
        &app.state.config.oauth_state_key,
    )
    .unwrap();

    let response = app
        .router
        .oneshot(callback_request(&format!("code=abc&state={}", stale), Some(CSRF)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_csrf_mismatch_rejected() {
    let app = common::create_test_app();
    let state = fresh_state(&app, "user-1");

    let wrong_cookie = app
        .router
        .clone()
        .oneshot(callback_request(
            &format!("code=abc&state={}", state),
            Some("fedcba9876543210"),
        ))
        .await
        .unwrap();
    assert_eq!(wrong_cookie.status(), StatusCode::BAD_REQUEST);

    let no_cookie = app
        .router
        .oneshot(callback_request(&format!("code=abc&state={}", state), None))
        .await
        .unwrap();
    assert_eq!(no_cookie.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_provider_error_redirects_to_frontend() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(callback_request("error=access_denied", Some(CSRF)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "http://localhost:5173/settings/integrations?provider=github&error=access_denied"
    );
    assert!(app.scheduler.is_empty());
}

#[tokio::test]
async fn test_callback_stores_connection_and_queues_sync() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = server
        .mock("POST", "/login/oauth/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"gho_abc","token_type":"bearer","scope":"read:user"}"#)
        .create_async()
        .await;
    let user_mock = server
        .mock("GET", "/user")
        .match_header("authorization", "Bearer gho_abc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":42,"login":"octo","followers":5}"#)
        .create_async()
        .await;
    let repos_mock = server
        .mock("GET", "/users/octo/repos")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"stargazers_count":7,"fork":false},{"stargazers_count":50,"fork":true}]"#)
        .create_async()
        .await;

    let token_url = format!("{}/login/oauth/access_token", server.url());
    let app = common::create_test_app_with(common::registry_with(&[
        ("INTEGRATION_GITHUB_CLIENT_ID", "gh-client"),
        ("INTEGRATION_GITHUB_SECRET", "gh-secret"),
        ("INTEGRATION_GITHUB_TOKEN_URL", token_url.as_str()),
        ("INTEGRATION_GITHUB_API_URL", server.url().as_str()),
    ]));
    let state = fresh_state(&app, "user-1");

    let response = app
        .router
        .oneshot(callback_request(
            &format!("code=the-code&state={}", state),
            Some(CSRF),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "http://localhost:5173/settings/integrations?connected=github"
    );

    token_mock.assert_async().await;
    user_mock.assert_async().await;
    repos_mock.assert_async().await;

    let id = Connection::make_id("user-1", ProviderId::GitHub, "42");
    let conn = app.store.get_connection(&id).await.unwrap().expect("connection stored");
    assert_eq!(conn.user_id, "user-1");
    assert_eq!(conn.username, "octo");
    assert_eq!(conn.access_token, "gho_abc");
    assert_eq!(conn.provider_info["stars"], 7);
    assert_eq!(conn.error_count, 0);

    // Profile, repos, timeline and milestones
    assert_eq!(app.scheduler.take().len(), 4);
}

#[tokio::test]
async fn test_callback_reconnect_keeps_history_and_clears_errors() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/login/oauth/access_token")
        .with_status(200)
        .with_body(r#"{"access_token":"gho_new"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/user")
        .with_status(200)
        .with_body(r#"{"id":42,"login":"octo","followers":5}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/users/octo/repos")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let token_url = format!("{}/login/oauth/access_token", server.url());
    let app = common::create_test_app_with(common::registry_with(&[
        ("INTEGRATION_GITHUB_TOKEN_URL", token_url.as_str()),
        ("INTEGRATION_GITHUB_API_URL", server.url().as_str()),
    ]));

    let mut old = common::test_connection("user-1", ProviderId::GitHub, "42");
    let created = Utc::now() - chrono::Duration::days(30);
    let scraped = Utc::now() - chrono::Duration::days(1);
    old.created_at = created;
    old.last_scraped_at = Some(scraped);
    old.error_count = 9;
    app.store.upsert_connection(&old).await.unwrap();

    let state = fresh_state(&app, "user-1");
    let response = app
        .router
        .oneshot(callback_request(
            &format!("code=c&state={}", state),
            Some(CSRF),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let conn = app.store.get_connection(&old.id).await.unwrap().unwrap();
    assert_eq!(conn.access_token, "gho_new");
    assert_eq!(conn.created_at, created);
    assert_eq!(conn.last_scraped_at, Some(scraped));
    assert_eq!(conn.error_count, 0);
}

#[tokio::test]
async fn test_callback_token_endpoint_without_token_fails() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/login/oauth/access_token")
        .with_status(200)
        .with_body(r#"{"error":"bad_verification_code"}"#)
        .expect(1)
        .create_async()
        .await;

    let token_url = format!("{}/login/oauth/access_token", server.url());
    let app = common::create_test_app_with(common::registry_with(&[(
        "INTEGRATION_GITHUB_TOKEN_URL",
        token_url.as_str(),
    )]));
    let state = fresh_state(&app, "user-1");

    let response = app
        .router
        .oneshot(callback_request(
            &format!("code=stale&state={}", state),
            Some(CSRF),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(app.store.list_connections_for_user("user-1").await.unwrap().is_empty());
    assert!(app.scheduler.is_empty());
}
