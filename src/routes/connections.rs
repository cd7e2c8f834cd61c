// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection management routes for the signed-in user.

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{Connection, NormalizedConnection};
use crate::providers::{strategy_for, ProviderDescriptor};
use crate::services::normalize::normalize;
use crate::services::sync::MAX_INTEGRATION_ERRORS;
use crate::services::tokens::INVALID_TOKEN_SENTINEL;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Prefix that makes the verification code easy to spot in a bio.
pub const VERIFICATION_PREFIX: &str = "devboard-";

/// Connection routes (session required).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/connections",
            get(list_connections).delete(delete_all_connections),
        )
        .route("/connections/verification-token", get(verification_token))
        .route("/connect/{provider}/verify", post(verify_connection))
        .route("/connections/{id}", delete(delete_connection))
}

/// Stable per-user code to place in a public bio for manual providers.
pub fn verification_token_for(user_id: &str, secret: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(b"verify|");
    mac.update(user_id.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{}{}", VERIFICATION_PREFIX, &digest[..16]))
}

fn view(state: &AppState, conn: &Connection) -> NormalizedConnection {
    let d = state.registry.lookup(conn.provider);
    normalize(conn, &d.name, MAX_INTEGRATION_ERRORS)
}

/// Normalized connections of the current user.
async fn list_connections(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<NormalizedConnection>>> {
    let connections = state.store.list_connections_for_user(&user.user_id).await?;
    Ok(Json(connections.iter().map(|c| view(&state, c)).collect()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationTokenResponse {
    pub token: String,
}

async fn verification_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<VerificationTokenResponse>> {
    let token = verification_token_for(&user.user_id, &state.config.oauth_state_key)?;
    Ok(Json(VerificationTokenResponse { token }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub username: String,
}

/// Connect a manual-validation provider by checking the user's public bio.
async fn verify_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(slug): Path<String>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<NormalizedConnection>> {
    let d = state
        .registry
        .find(&slug)
        .ok_or_else(|| AppError::NotFound(format!("Unknown provider: {}", slug)))?;
    if !d.flags.is_manual_validation {
        return Err(AppError::BadRequest(format!(
            "{} is connected through OAuth",
            d.name
        )));
    }

    let username = body.username.trim().trim_start_matches('@');
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }

    let token = verification_token_for(&user.user_id, &state.config.oauth_state_key)?;
    let info = strategy_for(d.id)
        .verify_manual(&state.http, &d, username, &token)
        .await?;

    let mut conn = Connection::new(
        &user.user_id,
        d.id,
        &info.external_id,
        &info.username,
        String::new(),
        info.info,
        Utc::now(),
    );

    // Re-verifying keeps history but clears health state
    if let Some(existing) = state.store.get_connection(&conn.id).await? {
        conn.keep_history_of(&existing);
    }
    state.store.upsert_connection(&conn).await?;

    let queued = state.sync.enqueue_connection(&conn).await;
    tracing::info!(
        user_id = %user.user_id,
        provider = %d.id,
        connection_id = %conn.id,
        queued = queued.queued,
        failed = queued.failed,
        "Manual connection verified"
    );

    Ok(Json(view(&state, &conn)))
}

/// Best-effort revoke before the connection is dropped.
async fn revoke_quietly(state: &AppState, d: &ProviderDescriptor, conn: &Connection) {
    if conn.access_token.is_empty() || conn.access_token == INVALID_TOKEN_SENTINEL {
        return;
    }
    if d.revoke_url.is_some() && !state.tokens.revoke(d, &conn.access_token).await {
        tracing::warn!(
            connection_id = %conn.id,
            provider = %conn.provider,
            "Token revoke failed (non-fatal)"
        );
    }
}

/// Disconnect one provider account.
async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    // Someone else's connection looks the same as a missing one
    let conn = state
        .store
        .get_connection(&id)
        .await?
        .filter(|c| c.user_id == user.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Connection {}", id)))?;

    let d = state.registry.lookup(conn.provider);
    revoke_quietly(&state, &d, &conn).await;
    state.store.delete_connection(&conn.id).await?;
    state
        .store
        .delete_snapshots(&conn.user_id, conn.provider)
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        connection_id = %conn.id,
        provider = %conn.provider,
        "Connection deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteAllResponse {
    pub deleted: usize,
}

/// Disconnect everything (account deletion).
async fn delete_all_connections(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeleteAllResponse>> {
    for conn in state.store.list_connections_for_user(&user.user_id).await? {
        let d = state.registry.lookup(conn.provider);
        revoke_quietly(&state, &d, &conn).await;
    }

    let deleted = state.store.delete_user_connections(&user.user_id).await?;
    tracing::info!(user_id = %user.user_id, deleted, "User connections deleted");

    Ok(Json(DeleteAllResponse { deleted }))
}
