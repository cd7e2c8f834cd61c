// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator routes, guarded by `require_admin`.

use crate::error::{AppError, Result};
use crate::models::NormalizedConnection;
use crate::providers::ProviderId;
use crate::services::backoff::tasks_disabled_flag;
use crate::services::normalize::normalize;
use crate::services::sync::MAX_INTEGRATION_ERRORS;
use crate::services::tasks::{TaskDefinition, TaskRequest, TASK_DEFINITIONS};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// How long a manual "disable tasks" lasts unless cleared.
pub const TASKS_DISABLED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/tasks", get(list_tasks))
        .route("/admin/tasks/enabled", post(set_tasks_enabled))
        .route("/admin/users/{user_id}/sync", post(sync_user))
        .route("/admin/connections/{id}/reset", post(reset_connection))
        .route("/admin/connections/{id}/pause", post(pause_connection))
        .route("/admin/connections/{id}/resume", post(resume_connection))
        .route("/admin/providers/{provider}/backoff", delete(clear_backoff))
}

/// Argument schemas of every task the service accepts.
async fn list_tasks() -> Json<&'static [TaskDefinition]> {
    Json(TASK_DEFINITIONS)
}

#[derive(Debug, Deserialize)]
pub struct TasksEnabledRequest {
    pub enabled: bool,
}

/// Pause or resume all sync tasks through the shared cache flag.
async fn set_tasks_enabled(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TasksEnabledRequest>,
) -> Result<StatusCode> {
    let flag = tasks_disabled_flag(state.cache.clone());
    if body.enabled {
        flag.clear().await?;
    } else {
        flag.raise(TASKS_DISABLED_TTL).await?;
    }
    tracing::warn!(enabled = body.enabled, "Sync tasks toggled by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// Queue a `sync-user` task.
async fn sync_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<StatusCode> {
    state
        .scheduler
        .enqueue(TaskRequest::sync_user(&user_id))
        .await?;
    tracing::info!(user_id = %user_id, "Queued sync-user task");
    Ok(StatusCode::ACCEPTED)
}

async fn connection_view(state: &AppState, id: &str) -> Result<Json<NormalizedConnection>> {
    let conn = state
        .store
        .get_connection(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {}", id)))?;
    let d = state.registry.lookup(conn.provider);
    Ok(Json(normalize(&conn, &d.name, MAX_INTEGRATION_ERRORS)))
}

/// Clear the error count of a disabled connection.
async fn reset_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NormalizedConnection>> {
    state.store.reset_error_count(&id).await?;
    tracing::info!(connection_id = %id, "Connection error count reset by admin");
    connection_view(&state, &id).await
}

async fn pause_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NormalizedConnection>> {
    state.store.set_paused(&id, true).await?;
    tracing::info!(connection_id = %id, "Connection paused by admin");
    connection_view(&state, &id).await
}

async fn resume_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NormalizedConnection>> {
    state.store.set_paused(&id, false).await?;
    tracing::info!(connection_id = %id, "Connection resumed by admin");
    connection_view(&state, &id).await
}

/// Lift a provider-wide rate-limit backoff early.
async fn clear_backoff(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<StatusCode> {
    let provider: ProviderId = slug.parse()?;
    state.sync.gate().reset(provider).await?;
    tracing::info!(provider = %provider, "Rate-limit backoff cleared by admin");
    Ok(StatusCode::NO_CONTENT)
}
