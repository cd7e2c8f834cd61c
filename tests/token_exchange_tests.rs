// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token endpoint tests against a mocked provider: encoding fallback,
//! revoke encodings, and refresh failure handling.

use chrono::Utc;
use devboard_integrations::db::ConnectionStore;
use devboard_integrations::providers::ProviderId;
use devboard_integrations::services::tokens::{
    parse_access_token, ExchangeRequest, RefreshOutcome, INVALID_TOKEN_SENTINEL,
};
use mockito::Matcher;

mod common;

const MULTIPART: &str = "^multipart/form-data";
const FORM: &str = "^application/x-www-form-urlencoded";

fn gitlab_app(server: &mockito::ServerGuard) -> common::TestApp {
    let token_url = format!("{}/oauth/token", server.url());
    let revoke_url = format!("{}/oauth/revoke", server.url());
    common::create_test_app_with(common::registry_with(&[
        ("INTEGRATION_GITLAB_CLIENT_ID", "gl-client"),
        ("INTEGRATION_GITLAB_SECRET", "gl-secret"),
        ("INTEGRATION_GITLAB_TOKEN_URL", token_url.as_str()),
        ("INTEGRATION_GITLAB_REVOKE_URL", revoke_url.as_str()),
    ]))
}

fn expired_connection() -> devboard_integrations::models::Connection {
    let mut conn = common::test_connection("user-1", ProviderId::GitLab, "7");
    conn.refresh_token = Some("refresh-1".to_string());
    conn.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
    conn
}

#[tokio::test]
async fn test_exchange_falls_back_to_form_encoding() {
    let mut server = mockito::Server::new_async().await;
    let multipart = server
        .mock("POST", "/oauth/token")
        .match_header("content-type", Matcher::Regex(MULTIPART.to_string()))
        .with_status(400)
        .with_body(r#"{"error":"unsupported_content_type"}"#)
        .expect(1)
        .create_async()
        .await;
    let form = server
        .mock("POST", "/oauth/token")
        .match_header("content-type", Matcher::Regex(FORM.to_string()))
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "the-code".into()),
            Matcher::UrlEncoded("client_id".into(), "gl-client".into()),
            Matcher::UrlEncoded("client_secret".into(), "gl-secret".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"gl-token","refresh_token":"gl-refresh","expires_in":7200}"#)
        .expect(1)
        .create_async()
        .await;

    let app = gitlab_app(&server);
    let d = app.state.registry.lookup(ProviderId::GitLab);
    let now = Utc::now();

    let response = app
        .state
        .tokens
        .exchange_code(
            &d,
            &ExchangeRequest {
                code: "the-code",
                redirect_uri: "http://localhost:8080/connect/gitlab/callback",
                csrf: None,
            },
        )
        .await
        .unwrap();
    let token = parse_access_token(ProviderId::GitLab, response, now)
        .await
        .unwrap();

    multipart.assert_async().await;
    form.assert_async().await;
    assert_eq!(token.access_token, "gl-token");
    assert_eq!(token.refresh_token.as_deref(), Some("gl-refresh"));
    assert_eq!(token.expires_at, Some(now + chrono::Duration::seconds(7200)));
}

#[tokio::test]
async fn test_exchange_accepts_form_encoded_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/x-www-form-urlencoded")
        .with_body("access_token=form-token&token_type=bearer")
        .create_async()
        .await;

    let app = gitlab_app(&server);
    let d = app.state.registry.lookup(ProviderId::GitLab);
    let response = app
        .state
        .tokens
        .exchange_code(
            &d,
            &ExchangeRequest {
                code: "c",
                redirect_uri: "http://localhost:8080/connect/gitlab/callback",
                csrf: None,
            },
        )
        .await
        .unwrap();

    let token = parse_access_token(ProviderId::GitLab, response, Utc::now())
        .await
        .unwrap();
    assert_eq!(token.access_token, "form-token");
    assert!(token.refresh_token.is_none());
}

#[tokio::test]
async fn test_revoke_sends_both_encodings_when_flagged() {
    let mut server = mockito::Server::new_async().await;
    let form = server
        .mock("POST", "/oauth/revoke")
        .match_header("content-type", Matcher::Regex(FORM.to_string()))
        .match_body(Matcher::UrlEncoded("token".into(), "tok".into()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let json = server
        .mock("POST", "/oauth/revoke")
        .match_header("content-type", Matcher::Regex("^application/json".to_string()))
        .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
        .match_body(Matcher::PartialJsonString(
            r#"{"token":"tok","access_token":"tok"}"#.to_string(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let app = gitlab_app(&server);
    let d = app.state.registry.lookup(ProviderId::GitLab);

    assert!(app.state.tokens.revoke(&d, "tok").await);
    form.assert_async().await;
    json.assert_async().await;
}

#[tokio::test]
async fn test_revoke_json_fallback_after_form_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/revoke_token")
        .match_header("content-type", Matcher::Regex(FORM.to_string()))
        .with_status(400)
        .create_async()
        .await;
    let json = server
        .mock("POST", "/api/v1/revoke_token")
        .match_header("content-type", Matcher::Regex("^application/json".to_string()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let revoke_url = format!("{}/api/v1/revoke_token", server.url());
    let app = common::create_test_app_with(common::registry_with(&[(
        "INTEGRATION_REDDIT_REVOKE_URL",
        revoke_url.as_str(),
    )]));
    let d = app.state.registry.lookup(ProviderId::Reddit);

    assert!(app.state.tokens.revoke(&d, "tok").await);
    json.assert_async().await;
}

#[tokio::test]
async fn test_revoke_without_endpoint_is_noop() {
    let app = common::create_test_app();
    let d = app.state.registry.lookup(ProviderId::HackerNews);
    assert!(!app.state.tokens.revoke(&d, "tok").await);
}

#[tokio::test]
async fn test_refresh_not_needed_for_live_token() {
    let app = common::create_test_app();
    let d = app.state.registry.lookup(ProviderId::GitLab);
    let mut conn = expired_connection();
    conn.expires_at = Some(Utc::now() + chrono::Duration::hours(1));

    let outcome = app
        .state
        .tokens
        .refresh_if_needed(&d, &conn, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::NotNeeded);
}

#[tokio::test]
async fn test_refresh_persists_new_tokens() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let app = gitlab_app(&server);
    let d = app.state.registry.lookup(ProviderId::GitLab);
    let conn = expired_connection();
    app.store.upsert_connection(&conn).await.unwrap();
    let now = Utc::now();

    let outcome = app.state.tokens.refresh_if_needed(&d, &conn, now).await.unwrap();
    let RefreshOutcome::Refreshed(updated) = outcome else {
        panic!("expected refresh, got {:?}", outcome);
    };
    assert_eq!(updated.access_token, "fresh");

    let stored = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "fresh");
    // Provider did not rotate the refresh token
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(stored.expires_at, Some(now + chrono::Duration::seconds(3600)));
}

#[tokio::test]
async fn test_refresh_invalid_grant_writes_sentinel() {
    let mut server = mockito::Server::new_async().await;
    // Both encodings are rejected
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant","error_description":"The refresh_token is invalid"}"#)
        .expect(2)
        .create_async()
        .await;

    let app = gitlab_app(&server);
    let d = app.state.registry.lookup(ProviderId::GitLab);
    let conn = expired_connection();
    app.store.upsert_connection(&conn).await.unwrap();

    let outcome = app
        .state
        .tokens
        .refresh_if_needed(&d, &conn, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::TokenInvalidated);
    mock.assert_async().await;

    let stored = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert_eq!(stored.access_token, INVALID_TOKEN_SENTINEL);
    assert_eq!(stored.refresh_token.as_deref(), Some(INVALID_TOKEN_SENTINEL));

    // Later runs short-circuit without calling the provider
    let again = app
        .state
        .tokens
        .refresh_if_needed(&d, &stored, Utc::now())
        .await
        .unwrap();
    assert_eq!(again, RefreshOutcome::TokenInvalidated);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_refresh_account_deleted_removes_connection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(400)
        .with_body(r#"{"error":"account_not_found"}"#)
        .create_async()
        .await;

    let app = gitlab_app(&server);
    let d = app.state.registry.lookup(ProviderId::GitLab);
    let conn = expired_connection();
    app.store.upsert_connection(&conn).await.unwrap();

    let outcome = app
        .state
        .tokens
        .refresh_if_needed(&d, &conn, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::AccountDeleted);
    assert!(app.store.get_connection(&conn.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_other_failure_keeps_stale_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(502)
        .with_body("Bad Gateway")
        .create_async()
        .await;

    let app = gitlab_app(&server);
    let d = app.state.registry.lookup(ProviderId::GitLab);
    let conn = expired_connection();
    app.store.upsert_connection(&conn).await.unwrap();

    let outcome = app
        .state
        .tokens
        .refresh_if_needed(&d, &conn, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::Failed);

    let stored = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-token");
}
