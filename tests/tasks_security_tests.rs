// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Security and dispatch tests for Cloud Task handlers.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use devboard_integrations::db::ConnectionStore;
use devboard_integrations::models::ScrapeType;
use devboard_integrations::providers::ProviderId;
use devboard_integrations::services::tasks::TaskRequest;
use serde_json::json;
use tower::ServiceExt;

mod common;

fn task_request(path: &str, queue: Option<&str>, payload: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(queue) = queue {
        builder = builder.header("x-cloudtasks-queuename", queue);
    }
    builder
        .body(Body::from(serde_json::to_string(&payload).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_sync_connection_no_header_forbidden() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(task_request(
            "/tasks/sync-connection",
            None,
            json!({"connection_id": "c1", "scrape_type": "profile"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sync_connection_wrong_queue_forbidden() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(task_request(
            "/tasks/sync-connection",
            Some("some-other-queue"),
            json!({"connection_id": "c1", "scrape_type": "profile"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sync_user_no_header_forbidden() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(task_request("/tasks/sync-user", None, json!({"user_id": "u1"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.scheduler.is_empty());
}

#[tokio::test]
async fn test_sync_connection_missing_connection_is_ok() {
    let app = common::create_test_app();

    // Deleted connections must not be retried forever
    let response = app
        .router
        .oneshot(task_request(
            "/tasks/sync-connection",
            Some("integration-sync"),
            json!({"connection_id": "gone", "scrape_type": "profile"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sync_user_fans_out_supported_scrapes() {
    let app = common::create_test_app();
    let github = common::test_connection("u1", ProviderId::GitHub, "1");
    let hn = common::test_connection("u1", ProviderId::HackerNews, "pg");
    let mut paused = common::test_connection("u1", ProviderId::Reddit, "r");
    paused.paused = true;
    for c in [&github, &hn, &paused] {
        app.store.upsert_connection(c).await.unwrap();
    }

    let response = app
        .router
        .oneshot(task_request(
            "/tasks/sync-user",
            Some("integration-sync"),
            json!({"user_id": "u1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let tasks = app.scheduler.take();
    // GitHub: profile, repos, timeline, milestones. Hacker News: profile, milestones.
    assert_eq!(tasks.len(), 6);
    assert!(tasks.iter().all(|t| t.delay.is_none()));
    assert!(tasks
        .iter()
        .any(|t| t.task == TaskRequest::sync_connection(&github.id, ScrapeType::Repos)));
    assert!(!tasks.iter().any(|t| matches!(
        &t.task,
        TaskRequest::SyncConnection(p) if p.connection_id == paused.id
    )));
}

#[tokio::test]
async fn test_sync_user_all_enqueues_fail_is_500() {
    let app = common::create_test_app();
    let github = common::test_connection("u1", ProviderId::GitHub, "1");
    app.store.upsert_connection(&github).await.unwrap();
    app.scheduler.set_fail_ids([github.id.clone()]);

    let response = app
        .router
        .oneshot(task_request(
            "/tasks/sync-user",
            Some("integration-sync"),
            json!({"user_id": "u1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_sync_connection_malformed_payload_rejected() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(task_request(
            "/tasks/sync-connection",
            Some("integration-sync"),
            json!({"connection_id": "c1", "scrape_type": "weekly"}),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
