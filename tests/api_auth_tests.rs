// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid session tokens
//! 2. Protected routes accept bearer and cookie sessions
//! 3. Admin routes require the admin token
//! 4. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use devboard_integrations::db::ConnectionStore;
use devboard_integrations::middleware::auth::create_jwt;
use devboard_integrations::models::NormalizedConnection;
use devboard_integrations::providers::ProviderId;
use tower::ServiceExt;

mod common;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_connections_requires_auth() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connections")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_connections_rejects_wrong_signing_key() {
    let app = common::create_test_app();
    let token = create_jwt("user-1", b"some_other_key_that_is_long_enough").unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connections")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_connections_with_bearer_lists_only_own() {
    let app = common::create_test_app();
    let token = common::session_token(&app.state, "user-1");

    let mut mine = common::test_connection("user-1", ProviderId::GitHub, "42");
    mine.provider_info = serde_json::json!({"login": "octo", "followers": 1500, "stars": 20});
    app.store.upsert_connection(&mine).await.unwrap();
    let theirs = common::test_connection("user-2", ProviderId::GitHub, "43");
    app.store.upsert_connection(&theirs).await.unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connections")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Vec<NormalizedConnection> =
        serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0].id, mine.id);
    assert_eq!(body[0].provider_name, "GitHub");
    assert_eq!(body[0].badge_text, "1.5K followers");
    assert!(!body[0].disabled);
}

#[tokio::test]
async fn test_connections_with_session_cookie() {
    let app = common::create_test_app();
    let token = common::session_token(&app.state, "user-1");

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/connections")
                .header(header::COOKIE, format!("devboard_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_delete_other_users_connection_is_not_found() {
    let app = common::create_test_app();
    let token = common::session_token(&app.state, "user-1");
    let theirs = common::test_connection("user-2", ProviderId::HackerNews, "pg");
    app.store.upsert_connection(&theirs).await.unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/connections/{}", theirs.id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.store.get_connection(&theirs.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_own_manual_connection() {
    let app = common::create_test_app();
    let token = common::session_token(&app.state, "user-1");
    let mine = common::test_connection("user-1", ProviderId::HackerNews, "pg");
    app.store.upsert_connection(&mine).await.unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/connections/{}", mine.id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.store.get_connection(&mine.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_admin_requires_token() {
    let app = common::create_test_app();

    let missing = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/tasks")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let wrong = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/tasks")
                .header("x-admin-token", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let ok = app
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/tasks")
                .header("x-admin-token", "test_admin_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let body = body_json(ok).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["sync-connection", "sync-user"]);
    assert_eq!(body[0]["args"][0]["name"], "connection_id");
}

#[tokio::test]
async fn test_session_token_is_not_admin() {
    let app = common::create_test_app();
    let token = common::session_token(&app.state, "user-1");

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/tasks")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cors_preflight_allows_frontend() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/connections")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/connections")
                .header(header::ORIGIN, "https://evil.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
