// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth connect routes for linking a provider account.

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::get,
    Extension, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::Connection;
use crate::providers::{strategy_for, ProviderDescriptor, ProviderId};
use crate::services::tokens::{parse_access_token, ExchangeRequest};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// CSRF cookie bound to the signed state. Also the PKCE verifier.
pub const CSRF_COOKIE: &str = "devboard_oauth_csrf";

const CSRF_COOKIE_PATH: &str = "/connect";

/// Maximum age of an OAuth state parameter.
pub const STATE_MAX_AGE_MS: i64 = 15 * 60 * 1000;

/// Start routes (session required).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/connect/{provider}", get(connect_start))
}

/// Callback route. The user is identified by the signed state, not the session.
pub fn callback_routes() -> Router<Arc<AppState>> {
    Router::new().route("/connect/{provider}/callback", get(connect_callback))
}

// ─── Signed state ────────────────────────────────────────────────

/// Verified contents of an OAuth state parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub user_id: String,
    pub csrf: String,
}

fn state_mac(payload: &str, secret: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Sign `user_id|csrf|timestamp_hex` and base64url the result.
pub fn sign_state(user_id: &str, csrf: &str, timestamp_ms: i64, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{}|{:x}", user_id, csrf, timestamp_ms);
    let signature = state_mac(&payload, secret)?.finalize().into_bytes();
    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Verify signature and age of an OAuth state parameter.
pub fn verify_state(state: &str, secret: &[u8], now_ms: i64) -> Option<OAuthState> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // csrf and timestamp are hex; the user ID takes the remainder
    let mut parts = state_str.rsplitn(4, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let csrf = parts.next()?;
    let user_id = parts.next()?;
    if user_id.is_empty() || csrf.is_empty() {
        return None;
    }

    let signature = hex::decode(signature_hex).ok()?;
    let payload = format!("{}|{}|{}", user_id, csrf, timestamp_hex);
    if state_mac(&payload, secret).ok()?.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let timestamp = i64::from_str_radix(timestamp_hex, 16).ok()?;
    let age = now_ms - timestamp;
    if !(0..=STATE_MAX_AGE_MS).contains(&age) {
        tracing::warn!(age_ms = age, "Expired OAuth state");
        return None;
    }

    Some(OAuthState {
        user_id: user_id.to_string(),
        csrf: csrf.to_string(),
    })
}

// ─── Handlers ────────────────────────────────────────────────────

fn callback_url(state: &AppState, provider: ProviderId) -> String {
    format!(
        "{}/connect/{}/callback",
        state.config.service_url.trim_end_matches('/'),
        provider.slug()
    )
}

fn oauth_descriptor(state: &AppState, slug: &str) -> Result<ProviderDescriptor> {
    let d = state
        .registry
        .find(slug)
        .ok_or_else(|| AppError::NotFound(format!("Unknown provider: {}", slug)))?;
    if d.flags.is_manual_validation {
        return Err(AppError::BadRequest(format!(
            "{} is connected by verification, not OAuth",
            d.name
        )));
    }
    Ok(d)
}

fn csrf_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, value))
        .path(CSRF_COOKIE_PATH)
        .http_only(true)
        .secure(state.config.service_url.starts_with("https://"))
        .same_site(SameSite::Lax)
        .build()
}

/// Start OAuth flow - redirect to the provider's authorization page.
async fn connect_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let d = oauth_descriptor(&state, &slug)?;

    let csrf = hex::encode(rand::random::<[u8; 32]>());
    let oauth_state = sign_state(
        &user.user_id,
        &csrf,
        Utc::now().timestamp_millis(),
        &state.config.oauth_state_key,
    )?;

    let auth_url =
        strategy_for(d.id).authorize_url(&d, &callback_url(&state, d.id), &oauth_state, &csrf);

    tracing::info!(
        user_id = %user.user_id,
        provider = %d.id,
        "Starting OAuth flow, redirecting to provider"
    );

    let jar = jar.add(csrf_cookie(&state, csrf));
    Ok((jar, Redirect::temporary(&auth_url)))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Frontend page the browser lands on after the callback.
fn frontend_redirect(state: &AppState, provider: &str, error: Option<&str>) -> Redirect {
    let base = format!(
        "{}/settings/integrations",
        state.config.frontend_url.trim_end_matches('/')
    );
    let url = match error {
        Some(e) => format!(
            "{}?provider={}&error={}",
            base,
            urlencoding::encode(provider),
            urlencoding::encode(e)
        ),
        None => format!("{}?connected={}", base, urlencoding::encode(provider)),
    };
    Redirect::temporary(&url)
}

/// OAuth callback - exchange the code, store the connection, queue the first sync.
async fn connect_callback(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let d = oauth_descriptor(&state, &slug)?;

    let cookie_csrf = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build(CSRF_COOKIE).path(CSRF_COOKIE_PATH));

    if let Some(error) = params.error {
        tracing::warn!(provider = %d.id, error = %error, "OAuth error from provider");
        return Ok((jar, frontend_redirect(&state, &slug, Some(&error))));
    }

    let oauth = params
        .state
        .as_deref()
        .and_then(|s| {
            verify_state(
                s,
                &state.config.oauth_state_key,
                Utc::now().timestamp_millis(),
            )
        })
        .ok_or_else(|| AppError::BadRequest("Invalid or expired OAuth state".to_string()))?;

    let csrf_ok = cookie_csrf
        .as_deref()
        .is_some_and(|c| bool::from(c.as_bytes().ct_eq(oauth.csrf.as_bytes())));
    if !csrf_ok {
        tracing::warn!(provider = %d.id, user_id = %oauth.user_id, "OAuth CSRF cookie mismatch");
        return Err(AppError::BadRequest("OAuth CSRF check failed".to_string()));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let redirect_uri = callback_url(&state, d.id);
    let response = state
        .tokens
        .exchange_code(
            &d,
            &ExchangeRequest {
                code: &code,
                redirect_uri: &redirect_uri,
                csrf: Some(&oauth.csrf),
            },
        )
        .await?;

    let now = Utc::now();
    let token = parse_access_token(d.id, response, now)
        .await
        .ok_or_else(|| AppError::provider(d.id, None, "Token exchange returned no access token"))?;

    let user_info = strategy_for(d.id)
        .fetch_user_info(&state.http, &d, &token.access_token)
        .await?;

    if let Some(uid) = token.uid.as_deref() {
        if uid != user_info.external_id {
            tracing::debug!(
                provider = %d.id,
                token_uid = uid,
                external_id = %user_info.external_id,
                "Token uid differs from user info id"
            );
        }
    }

    let mut conn = Connection::new(
        &oauth.user_id,
        d.id,
        &user_info.external_id,
        &user_info.username,
        token.access_token,
        user_info.info,
        now,
    );
    conn.refresh_token = token.refresh_token;
    conn.expires_at = token.expires_at;

    // Reconnecting keeps history but clears health state
    if let Some(existing) = state.store.get_connection(&conn.id).await? {
        conn.keep_history_of(&existing);
    }

    state.store.upsert_connection(&conn).await?;

    let queued = state.sync.enqueue_connection(&conn).await;
    if !queued.is_complete_success() {
        tracing::warn!(
            connection_id = %conn.id,
            queued = queued.queued,
            failed = queued.failed,
            "Failed to queue some initial sync tasks"
        );
    }

    tracing::info!(
        user_id = %oauth.user_id,
        provider = %d.id,
        connection_id = %conn.id,
        "Connection stored"
    );

    Ok((jar, frontend_redirect(&state, &slug, None)))
}
