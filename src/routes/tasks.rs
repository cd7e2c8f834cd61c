// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by Cloud Tasks, not directly by users, and sit
//! behind `require_tasks_auth`. A 500 tells the queue to retry, so it is
//! only returned for infrastructure failures; provider failures are already
//! recorded on the connection.

use crate::services::sync::SyncOutcome;
use crate::services::tasks::{SyncConnectionPayload, SyncUserPayload, SYNC_CONNECTION_PATH, SYNC_USER_PATH};
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use std::sync::Arc;

/// Task handler routes (called by Cloud Tasks).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(SYNC_CONNECTION_PATH, post(sync_connection))
        .route(SYNC_USER_PATH, post(sync_user))
}

/// Run one scrape for one connection.
async fn sync_connection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncConnectionPayload>,
) -> StatusCode {
    tracing::info!(
        connection_id = %payload.connection_id,
        scrape_type = %payload.scrape_type,
        attempt = payload.attempt,
        "Processing sync task"
    );

    match state.sync.sync_connection(&payload).await {
        Ok(outcome) => {
            match &outcome {
                SyncOutcome::Skipped { reason } => tracing::debug!(
                    connection_id = %payload.connection_id,
                    reason = ?reason,
                    "Sync skipped"
                ),
                other => tracing::info!(
                    connection_id = %payload.connection_id,
                    scrape_type = %payload.scrape_type,
                    outcome = ?other,
                    "Sync task finished"
                ),
            }
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(
                connection_id = %payload.connection_id,
                scrape_type = %payload.scrape_type,
                error = %e,
                "Sync task failed"
            );
            // Return 500 to trigger Cloud Tasks retry
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Fan out every supported scrape for a user's active connections.
async fn sync_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncUserPayload>,
) -> StatusCode {
    match state.sync.enqueue_all_for_user(&payload.user_id).await {
        Ok(result) if result.is_complete_failure() => {
            tracing::error!(
                user_id = %payload.user_id,
                failed = result.failed,
                "Failed to queue any sync tasks for user"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Ok(result) => {
            if result.is_partial_failure() {
                tracing::warn!(
                    user_id = %payload.user_id,
                    queued = result.queued,
                    failed = result.failed,
                    "Some sync tasks failed to queue"
                );
            } else {
                tracing::info!(
                    user_id = %payload.user_id,
                    queued = result.queued,
                    "Queued sync tasks for user"
                );
            }
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(user_id = %payload.user_id, error = %e, "Failed to list connections");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
